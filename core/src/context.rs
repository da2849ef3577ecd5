use std::sync::Arc;

use crate::chain::SandboxOrchestrator;
use crate::cloud::{ControlPlane, PrecacheApi, RegistryCatalog, ShellExec, TokenSource};
use crate::config::{AppConfig, PrecacheMode};
use crate::error::ConfigError;
use crate::executor::ExecutorRegistry;
use crate::precache::{
    ImageCatalog, ImageFilter, PrecacheTaskStrategy, Precacher, ProbeToolStrategy, WarmStrategy,
};
use crate::progress::ProgressSink;

/// Remote collaborators, built once per process.
#[derive(Clone)]
pub struct Services {
    pub control: Arc<dyn ControlPlane>,
    pub tokens: Arc<dyn TokenSource>,
    pub precache: Arc<dyn PrecacheApi>,
    pub catalog: Arc<dyn RegistryCatalog>,
    pub shell: Arc<dyn ShellExec>,
}

#[async_trait::async_trait]
pub trait ServicesFactory: Send + Sync {
    async fn build_services(&self, cfg: &AppConfig) -> Result<Services, ConfigError>;
}

/// Configuration plus the process-wide executor registry.
#[derive(Clone)]
pub struct AppContext {
    cfg: AppConfig,
    registry: Arc<ExecutorRegistry>,
    services_factory: Option<Arc<dyn ServicesFactory>>,
}

impl AppContext {
    pub fn new(cfg: AppConfig, services_factory: Option<Arc<dyn ServicesFactory>>) -> Self {
        let registry = Arc::new(ExecutorRegistry::new(cfg.executor.options()));
        Self {
            cfg,
            registry,
            services_factory,
        }
    }

    pub fn cfg(&self) -> &AppConfig {
        &self.cfg
    }

    pub fn registry(&self) -> Arc<ExecutorRegistry> {
        self.registry.clone()
    }

    pub async fn build_services(&self) -> Result<Services, ConfigError> {
        let Some(factory) = self.services_factory.as_ref() else {
            return Err(ConfigError::Invalid {
                field: "services",
                reason: "services_factory missing (cannot build remote clients)".into(),
            });
        };
        factory.build_services(&self.cfg).await
    }

    pub fn orchestrator(&self, services: &Services) -> SandboxOrchestrator {
        SandboxOrchestrator::new(
            services.control.clone(),
            services.shell.clone(),
            &self.registry,
        )
    }

    /// Wires a precacher for the configured mode. Fails on an invalid image
    /// pattern.
    pub fn precacher(
        &self,
        services: &Services,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<Precacher, ConfigError> {
        let p = &self.cfg.precache;
        let filter = ImageFilter::compile(p.image_regex.as_deref())?;
        let catalog = ImageCatalog::new(
            services.catalog.clone(),
            p.registry_id.clone(),
            p.namespace.clone(),
            p.registry_domain.clone(),
        );
        let strategy: Arc<dyn WarmStrategy> = match p.mode {
            PrecacheMode::Precache => Arc::new(PrecacheTaskStrategy::new(
                services.precache.clone(),
                p.image_registry_type.clone(),
                p.timing(),
            )),
            PrecacheMode::SandboxTool => Arc::new(ProbeToolStrategy::new(
                services.precache.clone(),
                p.image_registry_type.clone(),
                p.role_arn.clone(),
                p.timing(),
            )),
        };
        Ok(Precacher::new(catalog, filter, strategy, progress, p.options()))
    }
}

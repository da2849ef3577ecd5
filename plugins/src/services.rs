//! ServicesFactory implementation: builds every remote collaborator from the
//! configuration so the CLI can share one set per process.
use std::sync::Arc;

use async_trait::async_trait;
use ags_core::api::{AppConfig, ConfigError, Services, ServicesFactory, TokenCache};

use crate::factory;

#[derive(Default)]
pub struct CloudServicesFactory;

#[async_trait]
impl ServicesFactory for CloudServicesFactory {
    async fn build_services(&self, cfg: &AppConfig) -> Result<Services, ConfigError> {
        cfg.validate_cloud()?;

        let ags = Arc::new(factory::build_ags(&cfg.cloud)?);
        let tcr = Arc::new(factory::build_tcr(&cfg.cloud)?);
        let tokens = Arc::new(TokenCache::new(ags.clone()));
        let shell = Arc::new(factory::build_shell(&cfg.cloud, tokens)?);

        tracing::debug!(
            ags_host = %cfg.cloud.ags_host(),
            tcr_host = %cfg.cloud.tcr_endpoint,
            region = %cfg.cloud.region,
            "cloud services ready"
        );
        Ok(Services {
            control: ags.clone(),
            tokens: ags.clone(),
            precache: ags,
            catalog: tcr,
            shell,
        })
    }
}

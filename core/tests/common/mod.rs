#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ags_core::api::{
    AppConfig, CloudError, ConfigError, ControlPlane, ImageVersion, IssuedToken, Page,
    PrecacheApi, PrecacheStatus, PrecacheTicket, ProbeToolSpec, RegistryCatalog, RegistryInfo,
    Repository, Services, ServicesFactory, ShellExec, ShellExecRequest, ShellExecResponse,
    TokenSource, ToolStatus,
};
use async_trait::async_trait;
use serde_json::{json, Value};

/// In-memory stand-in for every remote collaborator.
#[derive(Default)]
pub struct FakeCloud {
    next_instance: AtomicUsize,
    pub started: Mutex<Vec<String>>,
    pub stopped: Mutex<Vec<String>>,
    pub commands: Mutex<Vec<(String, String)>>,
    pub tokens_issued: AtomicUsize,
    /// registry namespace → repository → versions
    pub repos: HashMap<String, Vec<String>>,
    /// Image tags whose warm-up always fails.
    pub failing_tags: Vec<String>,
    pub warm_attempts: Mutex<HashMap<String, usize>>,
    pub deleted_tools: Mutex<Vec<String>>,
}

impl FakeCloud {
    pub fn with_repos(repos: &[(&str, &[&str])]) -> Self {
        Self {
            repos: repos
                .iter()
                .map(|(r, vs)| (r.to_string(), vs.iter().map(|v| v.to_string()).collect()))
                .collect(),
            ..Default::default()
        }
    }

    fn record_attempt(&self, image: &str) -> bool {
        *self
            .warm_attempts
            .lock()
            .unwrap()
            .entry(image.to_string())
            .or_default() += 1;
        let tag = image.rsplit(':').next().unwrap_or_default();
        !self.failing_tags.iter().any(|t| t == tag)
    }
}

#[async_trait]
impl ControlPlane for FakeCloud {
    async fn start_instance(&self, params: Value) -> Result<Value, CloudError> {
        if params.get("ToolName").and_then(Value::as_str) == Some("missing-tool") {
            return Err(CloudError::api("ResourceNotFound.Tool", "tool not found", None));
        }
        let n = self.next_instance.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("inst-{n}");
        self.started.lock().unwrap().push(id.clone());
        Ok(json!({"Instance": {"InstanceId": id}, "RequestId": format!("req-{n}")}))
    }

    async fn stop_instance(&self, instance_id: &str) -> Result<Value, CloudError> {
        self.stopped.lock().unwrap().push(instance_id.to_string());
        Ok(json!({"RequestId": format!("stop-{instance_id}")}))
    }
}

#[async_trait]
impl TokenSource for FakeCloud {
    async fn acquire_token(&self, instance_id: &str) -> Result<IssuedToken, CloudError> {
        self.tokens_issued.fetch_add(1, Ordering::SeqCst);
        Ok(IssuedToken {
            token: format!("tok-{instance_id}"),
            expires_at: None,
        })
    }
}

#[async_trait]
impl ShellExec for FakeCloud {
    async fn exec(
        &self,
        instance_id: &str,
        _port: u16,
        request: ShellExecRequest,
    ) -> ShellExecResponse {
        self.commands
            .lock()
            .unwrap()
            .push((instance_id.to_string(), request.command));
        ShellExecResponse {
            success: true,
            output: "ok".to_string(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl PrecacheApi for FakeCloud {
    async fn create_precache_task(
        &self,
        image: &str,
        registry_type: &str,
    ) -> Result<PrecacheTicket, CloudError> {
        Ok(PrecacheTicket {
            image: image.to_string(),
            image_digest: "sha256:0".to_string(),
            registry_type: registry_type.to_string(),
        })
    }

    async fn describe_precache_task(
        &self,
        ticket: &PrecacheTicket,
    ) -> Result<PrecacheStatus, CloudError> {
        if self.record_attempt(&ticket.image) {
            Ok(PrecacheStatus::Success)
        } else {
            Ok(PrecacheStatus::Failed("manifest unknown".to_string()))
        }
    }

    async fn create_probe_tool(&self, spec: &ProbeToolSpec) -> Result<String, CloudError> {
        Ok(format!("tool-for-{}", spec.image))
    }

    async fn delete_tool(&self, tool_id: &str) -> Result<(), CloudError> {
        self.deleted_tools.lock().unwrap().push(tool_id.to_string());
        Ok(())
    }

    async fn tool_status(&self, tool_id: &str) -> Result<ToolStatus, CloudError> {
        let image = tool_id.trim_start_matches("tool-for-");
        if self.record_attempt(image) {
            Ok(ToolStatus::Active)
        } else {
            Ok(ToolStatus::Failed)
        }
    }
}

#[async_trait]
impl RegistryCatalog for FakeCloud {
    async fn describe_registry(&self, registry_id: &str) -> Result<RegistryInfo, CloudError> {
        Ok(RegistryInfo {
            registry_id: registry_id.to_string(),
            name: "fakereg".to_string(),
        })
    }

    async fn list_repositories(
        &self,
        _registry_id: &str,
        namespace: &str,
        _page: u64,
        _page_size: u64,
    ) -> Result<Page<Repository>, CloudError> {
        let mut names: Vec<_> = self.repos.keys().cloned().collect();
        names.sort();
        Ok(Page {
            total_count: Some(names.len() as u64),
            items: names
                .into_iter()
                .map(|r| Repository {
                    name: format!("{namespace}/{r}"),
                })
                .collect(),
        })
    }

    async fn list_images(
        &self,
        _registry_id: &str,
        _namespace: &str,
        repository: &str,
        _page: u64,
        _page_size: u64,
    ) -> Result<Page<ImageVersion>, CloudError> {
        let versions = self.repos.get(repository).cloned().unwrap_or_default();
        Ok(Page {
            total_count: Some(versions.len() as u64),
            items: versions
                .into_iter()
                .map(|version| ImageVersion { version })
                .collect(),
        })
    }
}

pub struct FakeFactory(pub Arc<FakeCloud>);

#[async_trait]
impl ServicesFactory for FakeFactory {
    async fn build_services(&self, _cfg: &AppConfig) -> Result<Services, ConfigError> {
        Ok(Services {
            control: self.0.clone(),
            tokens: self.0.clone(),
            precache: self.0.clone(),
            catalog: self.0.clone(),
            shell: self.0.clone(),
        })
    }
}

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.cloud.secret_id = "id".into();
    cfg.cloud.secret_key = "key".into();
    cfg.precache.registry_id = "tcr-test".into();
    cfg.precache.namespace = "team".into();
    cfg.precache.poll_interval_secs = 1;
    cfg.precache.task_timeout_secs = 30;
    cfg
}

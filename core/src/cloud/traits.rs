use async_trait::async_trait;
use serde_json::Value;

use crate::error::CloudError;

use super::types::{
    ImageVersion, IssuedToken, Page, PrecacheStatus, PrecacheTicket, ProbeToolSpec, RegistryInfo,
    Repository, ShellExecRequest, ShellExecResponse, ToolStatus,
};

/// Sandbox instance lifecycle on the control plane.
///
/// Both calls return the raw `Response` object of the API so callers can dig out
/// generated identifiers (`Instance.InstanceId`, `RequestId`).
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn start_instance(&self, params: Value) -> Result<Value, CloudError>;
    async fn stop_instance(&self, instance_id: &str) -> Result<Value, CloudError>;
}

/// Issues short-lived data-plane access tokens for a sandbox instance.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn acquire_token(&self, instance_id: &str) -> Result<IssuedToken, CloudError>;
}

/// Image warm-up operations.
#[async_trait]
pub trait PrecacheApi: Send + Sync {
    async fn create_precache_task(
        &self,
        image: &str,
        registry_type: &str,
    ) -> Result<PrecacheTicket, CloudError>;

    async fn describe_precache_task(
        &self,
        ticket: &PrecacheTicket,
    ) -> Result<PrecacheStatus, CloudError>;

    /// Returns the generated tool id.
    async fn create_probe_tool(&self, spec: &ProbeToolSpec) -> Result<String, CloudError>;

    async fn delete_tool(&self, tool_id: &str) -> Result<(), CloudError>;

    async fn tool_status(&self, tool_id: &str) -> Result<ToolStatus, CloudError>;
}

/// Offset/limit listing over a container registry. `page` starts at 1.
#[async_trait]
pub trait RegistryCatalog: Send + Sync {
    async fn describe_registry(&self, registry_id: &str) -> Result<RegistryInfo, CloudError>;

    async fn list_repositories(
        &self,
        registry_id: &str,
        namespace: &str,
        page: u64,
        page_size: u64,
    ) -> Result<Page<Repository>, CloudError>;

    async fn list_images(
        &self,
        registry_id: &str,
        namespace: &str,
        repository: &str,
        page: u64,
        page_size: u64,
    ) -> Result<Page<ImageVersion>, CloudError>;
}

/// Runs a shell command inside a sandbox through its command-execution service.
///
/// Failures are reported inside the response (`error`), mirroring how the
/// service itself reports non-zero exits.
#[async_trait]
pub trait ShellExec: Send + Sync {
    async fn exec(&self, instance_id: &str, port: u16, request: ShellExecRequest)
        -> ShellExecResponse;
}

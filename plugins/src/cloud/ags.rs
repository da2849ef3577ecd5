use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use ags_core::api::{
    CloudError, ControlPlane, IssuedToken, PrecacheApi, PrecacheStatus, PrecacheTicket,
    ProbeToolSpec, TokenSource, ToolStatus,
};

use super::client::CloudApiClient;

/// Agent Sandbox control-plane API: instances, access tokens, image warm-up and
/// sandbox tools.
pub struct AgsClient {
    api: CloudApiClient,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    expires_at: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PrecacheTaskResponse {
    #[serde(default)]
    image: String,
    #[serde(default)]
    image_digest: String,
    #[serde(default)]
    image_registry_type: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateToolResponse {
    #[serde(default)]
    tool_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ToolListResponse {
    #[serde(default)]
    sandbox_tool_set: Vec<ToolSummary>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ToolSummary {
    #[serde(default)]
    status: String,
}

fn create_tool_params(spec: &ProbeToolSpec) -> Value {
    json!({
        "ToolName": spec.name,
        "ToolType": "custom",
        "RoleArn": spec.role_arn,
        "NetworkConfiguration": { "NetworkMode": "PUBLIC" },
        "CustomConfiguration": {
            "Image": spec.image,
            "ImageRegistryType": spec.registry_type,
            "Command": spec.command,
            "Resources": { "CPU": spec.cpu, "Memory": spec.memory },
            "Probe": {
                "HttpGet": {
                    "Path": spec.probe.path,
                    "Port": spec.probe.port,
                    "Scheme": spec.probe.scheme,
                },
                "ReadyTimeoutMs": spec.probe.ready_timeout_ms,
                "ProbeTimeoutMs": spec.probe.probe_timeout_ms,
                "ProbePeriodMs": spec.probe.probe_period_ms,
                "SuccessThreshold": spec.probe.success_threshold,
                "FailureThreshold": spec.probe.failure_threshold,
            },
        },
    })
}

impl AgsClient {
    pub fn new(api: CloudApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ControlPlane for AgsClient {
    async fn start_instance(&self, params: Value) -> Result<Value, CloudError> {
        self.api.call("StartSandboxInstance", &params).await
    }

    async fn stop_instance(&self, instance_id: &str) -> Result<Value, CloudError> {
        self.api
            .call("StopSandboxInstance", &json!({ "InstanceId": instance_id }))
            .await
    }
}

#[async_trait]
impl TokenSource for AgsClient {
    async fn acquire_token(&self, instance_id: &str) -> Result<IssuedToken, CloudError> {
        let resp: TokenResponse = self
            .api
            .call_as(
                "AcquireSandboxInstanceToken",
                &json!({ "InstanceId": instance_id }),
            )
            .await?;
        let token = resp
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CloudError::empty("Token"))?;
        Ok(IssuedToken {
            token,
            expires_at: resp.expires_at,
        })
    }
}

#[async_trait]
impl PrecacheApi for AgsClient {
    async fn create_precache_task(
        &self,
        image: &str,
        registry_type: &str,
    ) -> Result<PrecacheTicket, CloudError> {
        let resp: PrecacheTaskResponse = self
            .api
            .call_as(
                "CreatePreCacheImageTask",
                &json!({ "Image": image, "ImageRegistryType": registry_type }),
            )
            .await?;
        Ok(PrecacheTicket {
            image: if resp.image.is_empty() {
                image.to_string()
            } else {
                resp.image
            },
            image_digest: resp.image_digest,
            registry_type: if resp.image_registry_type.is_empty() {
                registry_type.to_string()
            } else {
                resp.image_registry_type
            },
        })
    }

    async fn describe_precache_task(
        &self,
        ticket: &PrecacheTicket,
    ) -> Result<PrecacheStatus, CloudError> {
        let mut params = json!({
            "Image": ticket.image,
            "ImageRegistryType": ticket.registry_type,
        });
        if !ticket.image_digest.is_empty() {
            params["ImageDigest"] = Value::String(ticket.image_digest.clone());
        }
        let resp: PrecacheTaskResponse = self
            .api
            .call_as("DescribePreCacheImageTask", &params)
            .await?;
        Ok(PrecacheStatus::from_api(&resp.status, &resp.message))
    }

    async fn create_probe_tool(&self, spec: &ProbeToolSpec) -> Result<String, CloudError> {
        let resp: CreateToolResponse = self
            .api
            .call_as("CreateSandboxTool", &create_tool_params(spec))
            .await?;
        if resp.tool_id.is_empty() {
            return Err(CloudError::empty("ToolId"));
        }
        Ok(resp.tool_id)
    }

    async fn delete_tool(&self, tool_id: &str) -> Result<(), CloudError> {
        self.api
            .call("DeleteSandboxTool", &json!({ "ToolId": tool_id }))
            .await
            .map(|_| ())
    }

    async fn tool_status(&self, tool_id: &str) -> Result<ToolStatus, CloudError> {
        let resp: ToolListResponse = self
            .api
            .call_as(
                "DescribeSandboxToolList",
                &json!({ "ToolIds": [tool_id], "Limit": 1 }),
            )
            .await?;
        resp.sandbox_tool_set
            .into_iter()
            .next()
            .map(|tool| ToolStatus::from_api(&tool.status))
            .ok_or_else(|| CloudError::not_found(format!("sandbox tool {} not found", tool_id)))
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::executor::Outcome;

pub const DEFAULT_SHELL_PORT: u16 = 8080;

/// Timed outcome of one control-plane call, as published through the stop
/// executor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ControlPlaneResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub timing_ms: u64,
}

impl ControlPlaneResponse {
    pub fn ok(data: Value, timing_ms: u64) -> Self {
        let request_id = data
            .get("RequestId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self {
            success: true,
            data: Some(data),
            error: None,
            request_id,
            timing_ms,
        }
    }

    pub fn failed(error: impl Into<String>, timing_ms: u64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            request_id: String::new(),
            timing_ms,
        }
    }

    /// `Instance.InstanceId` of a start response.
    pub fn instance_id(&self) -> Option<&str> {
        self.data
            .as_ref()?
            .get("Instance")?
            .get("InstanceId")?
            .as_str()
            .filter(|id| !id.is_empty())
    }
}

impl Outcome for ControlPlaneResponse {
    fn succeeded(&self) -> bool {
        self.success
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    /// RFC 3339 timestamp, when the service reports one.
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecacheTicket {
    pub image: String,
    pub image_digest: String,
    pub registry_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrecacheStatus {
    Pending,
    Success,
    Failed(String),
}

impl PrecacheStatus {
    pub fn from_api(status: &str, message: &str) -> Self {
        match status {
            "Success" => Self::Success,
            "Failed" => Self::Failed(message.to_string()),
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolStatus {
    Creating,
    Active,
    Deleting,
    Failed,
    Other(String),
}

impl ToolStatus {
    pub fn from_api(status: &str) -> Self {
        match status {
            "CREATING" => Self::Creating,
            "ACTIVE" => Self::Active,
            "DELETING" => Self::Deleting,
            "FAILED" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }
}

/// HTTP readiness probe attached to a disposable sandbox tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSpec {
    pub path: String,
    pub port: u16,
    pub scheme: String,
    pub ready_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    pub probe_period_ms: u64,
    pub success_threshold: u32,
    pub failure_threshold: u32,
}

impl Default for ProbeSpec {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            port: 80,
            scheme: "HTTP".to_string(),
            ready_timeout_ms: 30_000,
            probe_timeout_ms: 3_000,
            probe_period_ms: 10_000,
            success_threshold: 1,
            failure_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeToolSpec {
    pub name: String,
    pub image: String,
    pub registry_type: String,
    pub role_arn: String,
    pub command: Vec<String>,
    pub cpu: String,
    pub memory: String,
    pub probe: ProbeSpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryInfo {
    pub registry_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    /// Full name, usually `namespace/repo`.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageVersion {
    pub version: String,
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShellExecRequest {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
}

impl ShellExecRequest {
    pub fn new(command: impl Into<String>, timeout: Option<u64>) -> Self {
        Self {
            command: command.into(),
            timeout,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShellExecResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub exit_code: i32,
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub timeout: bool,
    #[serde(default)]
    pub timing_ms: u64,
}

impl Outcome for ShellExecResponse {
    fn succeeded(&self) -> bool {
        self.success && self.error.is_none()
    }
}

impl ShellExecResponse {
    pub fn failed(error: impl Into<String>, timing_ms: u64) -> Self {
        Self {
            error: Some(error.into()),
            timing_ms,
            ..Default::default()
        }
    }
}

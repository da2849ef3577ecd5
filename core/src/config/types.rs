use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;
use crate::executor::{ExecutorOptions, DEFAULT_POOL_SIZE};
use crate::jitter::DEFAULT_DELAY_JITTER_PCT;
use crate::precache::{PrecacheOptions, WarmTiming, DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub cloud: CloudConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub precache: PrecacheConfig,

    #[serde(default)]
    pub loadtest: LoadTestConfig,
}

impl AppConfig {
    /// Credentials are needed by every remote call.
    pub fn validate_cloud(&self) -> Result<(), ConfigError> {
        if self.cloud.secret_id.trim().is_empty() {
            return Err(ConfigError::Missing("cloud.secret_id"));
        }
        if self.cloud.secret_key.trim().is_empty() {
            return Err(ConfigError::Missing("cloud.secret_key"));
        }
        if self.cloud.region.trim().is_empty() {
            return Err(ConfigError::Missing("cloud.region"));
        }
        Ok(())
    }

    pub fn validate_for_precache(&self) -> Result<(), ConfigError> {
        self.validate_cloud()?;
        let p = &self.precache;
        if p.registry_id.trim().is_empty() {
            return Err(ConfigError::Missing("precache.registry_id"));
        }
        if p.namespace.trim().is_empty() {
            return Err(ConfigError::Missing("precache.namespace"));
        }
        if p.mode == PrecacheMode::SandboxTool && p.role_arn.trim().is_empty() {
            return Err(ConfigError::Missing("precache.role_arn"));
        }
        if p.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "precache.poll_interval_secs",
                reason: "must be positive".to_string(),
            });
        }
        if p.task_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "precache.task_timeout_secs",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn validate_for_loadtest(&self) -> Result<(), ConfigError> {
        self.validate_cloud()?;
        let l = &self.loadtest;
        if l.iterations == 0 {
            return Err(ConfigError::Invalid {
                field: "loadtest.iterations",
                reason: "must be positive".to_string(),
            });
        }
        if !l.instance_params.is_object() {
            return Err(ConfigError::Invalid {
                field: "loadtest.instance_params",
                reason: "must be a table".to_string(),
            });
        }
        if l.port == 0 {
            return Err(ConfigError::Invalid {
                field: "loadtest.port",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "ags_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

/// Which control-plane endpoint family to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgsMode {
    #[default]
    Public,
    Pre,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub secret_id: String,

    #[serde(default)]
    pub secret_key: String,

    #[serde(default)]
    pub ags_mode: AgsMode,

    /// Overrides the host derived from `ags_mode`.
    #[serde(default)]
    pub ags_endpoint: Option<String>,

    #[serde(default = "default_tcr_endpoint")]
    pub tcr_endpoint: String,

    #[serde(default = "default_data_plane_domain_suffix")]
    pub data_plane_domain_suffix: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Requests per second allowed against the sandbox API.
    #[serde(default = "default_ags_rate_limit")]
    pub ags_rate_limit: u32,

    /// Requests per second allowed against the registry API.
    #[serde(default = "default_tcr_rate_limit")]
    pub tcr_rate_limit: u32,
}

fn default_region() -> String {
    "ap-guangzhou".to_string()
}

fn default_tcr_endpoint() -> String {
    "tcr.tencentcloudapi.com".to_string()
}

fn default_data_plane_domain_suffix() -> String {
    "tencentags.com".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_ags_rate_limit() -> u32 {
    5
}

fn default_tcr_rate_limit() -> u32 {
    100
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            secret_id: String::new(),
            secret_key: String::new(),
            ags_mode: AgsMode::default(),
            ags_endpoint: None,
            tcr_endpoint: default_tcr_endpoint(),
            data_plane_domain_suffix: default_data_plane_domain_suffix(),
            request_timeout_ms: default_request_timeout_ms(),
            ags_rate_limit: default_ags_rate_limit(),
            tcr_rate_limit: default_tcr_rate_limit(),
        }
    }
}

impl CloudConfig {
    /// Host of the sandbox control-plane API.
    pub fn ags_host(&self) -> String {
        if let Some(host) = self.ags_endpoint.as_deref().map(str::trim) {
            if !host.is_empty() {
                return host.to_string();
            }
        }
        match self.ags_mode {
            AgsMode::Public => "ags.tencentcloudapi.com".to_string(),
            AgsMode::Pre => "ags.pre.tencentcloudapi.woa.com".to_string(),
            AgsMode::Internal => format!("ags.{}.tencentcloudapi.woa.com", self.region),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    #[serde(default = "default_delay_jitter_pct")]
    pub delay_jitter_pct: u32,
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_delay_jitter_pct() -> u32 {
    DEFAULT_DELAY_JITTER_PCT
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            delay_jitter_pct: default_delay_jitter_pct(),
        }
    }
}

impl ExecutorConfig {
    pub fn options(&self) -> ExecutorOptions {
        ExecutorOptions {
            pool_size: self.pool_size,
            delay_jitter_pct: self.delay_jitter_pct,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrecacheMode {
    /// Platform pre-cache task API.
    #[default]
    Precache,
    /// Disposable sandbox tool with a readiness probe.
    SandboxTool,
}

impl std::str::FromStr for PrecacheMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "precache" => Ok(Self::Precache),
            "sandboxtool" => Ok(Self::SandboxTool),
            other => Err(ConfigError::Invalid {
                field: "precache.mode",
                reason: format!("unknown mode '{other}' (expected precache or sandboxtool)"),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecacheConfig {
    #[serde(default)]
    pub mode: PrecacheMode,

    /// Role assumed by probe tools (sandboxtool mode only).
    #[serde(default)]
    pub role_arn: String,

    #[serde(default)]
    pub registry_id: String,

    #[serde(default)]
    pub namespace: String,

    /// Only image references matching this pattern are warmed.
    #[serde(default)]
    pub image_regex: Option<String>,

    #[serde(default = "default_image_registry_type")]
    pub image_registry_type: String,

    #[serde(default = "default_registry_domain")]
    pub registry_domain: String,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
}

fn default_image_registry_type() -> String {
    "enterprise".to_string()
}

fn default_registry_domain() -> String {
    "tencentcloudcr.com".to_string()
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_task_timeout_secs() -> u64 {
    30 * 60
}

impl Default for PrecacheConfig {
    fn default() -> Self {
        Self {
            mode: PrecacheMode::default(),
            role_arn: String::new(),
            registry_id: String::new(),
            namespace: String::new(),
            image_regex: None,
            image_registry_type: default_image_registry_type(),
            registry_domain: default_registry_domain(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            poll_interval_secs: default_poll_interval_secs(),
            task_timeout_secs: default_task_timeout_secs(),
        }
    }
}

impl PrecacheConfig {
    pub fn options(&self) -> PrecacheOptions {
        PrecacheOptions {
            concurrency: self.concurrency,
            max_retries: self.max_retries,
        }
    }

    pub fn timing(&self) -> WarmTiming {
        WarmTiming {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            task_timeout: Duration::from_secs(self.task_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadTestConfig {
    #[serde(default = "default_iterations")]
    pub iterations: u64,

    /// Pause between iterations.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Delay before a started instance is stopped (or the stress chain starts).
    #[serde(default = "default_stop_after_secs")]
    pub stop_after_secs: u64,

    /// Port of the in-sandbox command service.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Run a stress chain on every started instance instead of a plain stop.
    #[serde(default)]
    pub stress: bool,

    /// Stress rounds, each a table of `StressConfig` keys.
    #[serde(default)]
    pub stress_rounds: Vec<Value>,

    /// Parameters of the start call (`ToolName`, `Timeout`, ...).
    #[serde(default = "default_instance_params")]
    pub instance_params: Value,

    #[serde(default = "default_drain_poll_ms")]
    pub drain_poll_ms: u64,

    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

fn default_iterations() -> u64 {
    1
}

fn default_interval_ms() -> u64 {
    1_000
}

fn default_stop_after_secs() -> u64 {
    60
}

fn default_port() -> u16 {
    crate::cloud::DEFAULT_SHELL_PORT
}

fn default_instance_params() -> Value {
    Value::Object(Default::default())
}

fn default_drain_poll_ms() -> u64 {
    500
}

fn default_drain_timeout_secs() -> u64 {
    600
}

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            interval_ms: default_interval_ms(),
            stop_after_secs: default_stop_after_secs(),
            port: default_port(),
            stress: false,
            stress_rounds: Vec::new(),
            instance_params: default_instance_params(),
            drain_poll_ms: default_drain_poll_ms(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

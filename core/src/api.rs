//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `ags_core::api` instead of reaching into internal modules.

pub use crate::chain::{SandboxOrchestrator, StressConfig, STOP_EXECUTOR, STRESS_EXECUTOR};
pub use crate::cloud::{
    ControlPlane, ControlPlaneResponse, ImageVersion, IssuedToken, Page, PrecacheApi,
    PrecacheStatus, PrecacheTicket, ProbeToolSpec, RegistryCatalog, RegistryInfo, Repository,
    ShellExec, ShellExecRequest, ShellExecResponse, TokenSource, ToolStatus, DEFAULT_SHELL_PORT,
};
pub use crate::config::{
    load, AgsMode, AppConfig, CloudConfig, LoadTestConfig, LoggingConfig, PrecacheConfig,
    PrecacheMode,
};
pub use crate::context::{AppContext, Services, ServicesFactory};
pub use crate::error::{
    ChainError, CliError, CloudError, CloudErrorKind, ConfigError, ExecutorError, PrecacheError,
    TokenError, WarmError,
};
pub use crate::executor::{AsyncTaskExecutor, ExecutorRegistry, Outcome, TaskResult};
pub use crate::precache::{PrecacheReport, Precacher};
pub use crate::progress::{IndicatifProgress, NoopProgress, ProgressSink, TaskStatus};
pub use crate::token::TokenCache;
pub use crate::util::RateLimiter;

//! Task chains on top of the shared executors: deferred stops and sequential
//! multi-round stress runs.

mod orchestrator;
mod plan;
mod stress;

pub use orchestrator::{SandboxOrchestrator, STOP_EXECUTOR, STRESS_EXECUTOR};
pub use plan::{build_plan, ChainStep};
pub use stress::{StressConfig, ROUND_TIMEOUT_GRACE_SECS};

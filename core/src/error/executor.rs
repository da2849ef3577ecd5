use thiserror::Error;

/// Submission-side failures of an async task executor.
///
/// Task bodies never surface here: their errors are stringified into the
/// task's result instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("executor '{name}' unavailable: {reason}")]
    PoolUnavailable { name: String, reason: String },

    #[error("executor '{name}' rejected task '{task_id}': pool at capacity ({capacity})")]
    Rejected {
        name: String,
        task_id: String,
        capacity: usize,
    },

    #[error("executor '{name}' has been released")]
    Released { name: String },
}

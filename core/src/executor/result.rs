use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Task payloads that carry their own success flag.
///
/// A task body can return `Ok` while the remote operation it wraps failed; the
/// flag reports that second level.
pub trait Outcome {
    fn succeeded(&self) -> bool;
}

/// Outcome of one executed task.
///
/// Built once by the executor and handed to exactly one drainer.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult<T> {
    /// Caller supplied identifier, not necessarily unique.
    pub task_id: String,

    /// Value returned by the task body; absent when the body failed.
    pub result: Option<T>,

    /// Stringified error of the task body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub started_at: DateTime<Utc>,

    pub ended_at: DateTime<Utc>,

    /// Wall-clock execution time in milliseconds (excludes the scheduling delay).
    pub duration_ms: u64,
}

impl<T> TaskResult<T> {
    pub(crate) fn from_outcome<E: Display>(
        task_id: String,
        outcome: Result<T, E>,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Self {
        let (result, error) = match outcome {
            Ok(value) => (Some(value), None),
            Err(err) => (None, Some(err.to_string())),
        };
        Self::new(task_id, result, error, started_at, ended_at)
    }

    pub(crate) fn new(
        task_id: String,
        result: Option<T>,
        error: Option<String>,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Self {
        let duration_ms = (ended_at - started_at).num_milliseconds().max(0) as u64;
        Self {
            task_id,
            result,
            error,
            started_at,
            ended_at,
            duration_ms,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl<T: Outcome> TaskResult<T> {
    /// The body returned a value and that value reports success.
    pub fn succeeded(&self) -> bool {
        self.is_ok() && self.result.as_ref().is_some_and(Outcome::succeeded)
    }
}

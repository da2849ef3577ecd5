//! Progress reporting for long-running batches.
//!
//! The batch processor only talks to [`ProgressSink`]; the CLI decides whether
//! that is a live terminal display or nothing at all.

mod monitor;

pub use monitor::IndicatifProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// Receiver of per-task progress events, keyed by task id.
///
/// Adding an id that is already present replaces its label and resets it to
/// running (retries reuse the image reference as id).
pub trait ProgressSink: Send + Sync {
    fn task_added(&self, id: &str, label: &str);
    fn task_updated(&self, id: &str, status: TaskStatus, message: &str);
    fn quit(&self);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn task_added(&self, _id: &str, _label: &str) {}
    fn task_updated(&self, _id: &str, _status: TaskStatus, _message: &str) {}
    fn quit(&self) {}
}

/// Running totals over terminal task events.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProgressTally {
    pub added: usize,
    pub completed: usize,
    pub failed: usize,
}

impl ProgressTally {
    pub fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Success => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Pending | TaskStatus::Running => {}
        }
    }

    pub fn in_flight(&self) -> usize {
        self.added.saturating_sub(self.completed + self.failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_counts_terminal_events_only() {
        let mut tally = ProgressTally {
            added: 4,
            ..Default::default()
        };
        tally.record(TaskStatus::Running);
        tally.record(TaskStatus::Success);
        tally.record(TaskStatus::Failed);
        tally.record(TaskStatus::Success);
        assert_eq!(tally.completed, 2);
        assert_eq!(tally.failed, 1);
        assert_eq!(tally.in_flight(), 1);
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
    }
}

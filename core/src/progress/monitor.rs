use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::{ProgressSink, ProgressTally, TaskStatus};

const TICK: Duration = Duration::from_millis(100);

/// Live terminal view of a batch: one spinner per in-flight task under a
/// summary line with completed/failed totals.
pub struct IndicatifProgress {
    multi: MultiProgress,
    overall: ProgressBar,
    state: Mutex<MonitorState>,
}

#[derive(Default)]
struct MonitorState {
    bars: HashMap<String, ProgressBar>,
    tally: ProgressTally,
    finished: bool,
}

fn task_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("  {spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"])
}

fn overall_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("[{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

impl IndicatifProgress {
    /// `enabled = false` keeps the bookkeeping but draws nothing.
    pub fn new(enabled: bool) -> Self {
        let target = if enabled {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let multi = MultiProgress::with_draw_target(target);
        let overall = multi.add(ProgressBar::new_spinner());
        overall.set_style(overall_style());
        overall.set_message("Starting...");

        Self {
            multi,
            overall,
            state: Mutex::new(MonitorState::default()),
        }
    }

    pub fn tally(&self) -> ProgressTally {
        self.lock().tally
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn refresh_summary(&self, tally: &ProgressTally) {
        self.overall.set_message(format!(
            "{} running, {} done, {} failed",
            tally.in_flight(),
            tally.completed,
            tally.failed
        ));
    }
}

impl ProgressSink for IndicatifProgress {
    fn task_added(&self, id: &str, label: &str) {
        let mut state = self.lock();
        if state.finished {
            return;
        }
        state.tally.added += 1;

        let bar = match state.bars.remove(id) {
            Some(bar) => bar,
            None => {
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.set_style(task_style());
                bar.enable_steady_tick(TICK);
                bar
            }
        };
        bar.set_message(format!("⏳ {label}"));
        state.bars.insert(id.to_string(), bar);

        let tally = state.tally;
        self.refresh_summary(&tally);
    }

    fn task_updated(&self, id: &str, status: TaskStatus, message: &str) {
        let mut state = self.lock();
        if state.finished {
            return;
        }
        state.tally.record(status);

        if status.is_terminal() {
            if let Some(bar) = state.bars.remove(id) {
                match status {
                    TaskStatus::Success => bar.finish_and_clear(),
                    _ => bar.abandon_with_message(format!("❌ {id}: {message}")),
                }
            }
        } else if let Some(bar) = state.bars.get(id) {
            bar.set_message(format!("⏳ {id} {message}"));
        }

        let tally = state.tally;
        self.refresh_summary(&tally);
    }

    fn quit(&self) {
        let mut state = self.lock();
        if state.finished {
            return;
        }
        state.finished = true;
        for (_, bar) in state.bars.drain() {
            bar.finish_and_clear();
        }
        let tally = state.tally;
        self.overall.finish_with_message(format!(
            "finished: {} done, {} failed",
            tally.completed, tally.failed
        ));
    }
}

impl Drop for IndicatifProgress {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, bar) in state.bars.drain() {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_monitor_keeps_totals() {
        let monitor = IndicatifProgress::new(false);
        monitor.task_added("a", "a");
        monitor.task_added("b", "b");
        monitor.task_updated("a", TaskStatus::Success, "");
        monitor.task_updated("b", TaskStatus::Failed, "pull error");
        monitor.task_added("b", "b (retry 1)");

        let tally = monitor.tally();
        assert_eq!(tally.added, 3);
        assert_eq!(tally.completed, 1);
        assert_eq!(tally.failed, 1);
        assert_eq!(tally.in_flight(), 1);
    }

    #[test]
    fn test_events_after_quit_are_ignored() {
        let monitor = IndicatifProgress::new(false);
        monitor.task_added("a", "a");
        monitor.quit();
        monitor.quit();
        monitor.task_updated("a", TaskStatus::Success, "");
        monitor.task_added("c", "c");
        assert_eq!(monitor.tally().completed, 0);
        assert_eq!(monitor.tally().added, 1);
    }
}

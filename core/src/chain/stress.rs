use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::jitter::jitter_count_with;

/// Seconds added to a round's own duration when waiting for its response.
pub const ROUND_TIMEOUT_GRACE_SECS: u64 = 10;

const DEFAULT_ROUND_TIMEOUT_SECS: u64 = 30;

/// One round of `stress-ng` load inside a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StressConfig {
    pub cpu_workers: u32,
    /// Target load per CPU worker, 1..=100.
    pub cpu_load: u32,
    pub vm_workers: u32,
    /// Memory per VM worker, `stress-ng` size syntax (`128M`, `1G`).
    pub vm_bytes: String,
    pub io_workers: u32,
    /// Round duration in seconds.
    pub timeout: u64,
    /// Spread applied to every numeric field, in percent.
    pub jitter: u32,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            cpu_workers: 2,
            cpu_load: 50,
            vm_workers: 1,
            vm_bytes: "128M".to_string(),
            io_workers: 1,
            timeout: DEFAULT_ROUND_TIMEOUT_SECS,
            jitter: 20,
        }
    }
}

impl StressConfig {
    /// Parses one round from its JSON description. Missing keys take their
    /// defaults, unknown keys are rejected and a zero timeout falls back to the
    /// default duration.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        let mut cfg = if value.is_null() {
            Self::default()
        } else {
            Self::deserialize(value)?
        };
        if cfg.timeout == 0 {
            cfg.timeout = DEFAULT_ROUND_TIMEOUT_SECS;
        }
        Ok(cfg)
    }

    pub fn apply_jitter(&self) -> Self {
        self.apply_jitter_with(&mut rand::thread_rng())
    }

    /// Perturbs the worker counts, load and duration by `jitter` percent.
    /// The result carries `jitter = 0` since the spread has been consumed.
    pub fn apply_jitter_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        let pct = self.jitter;
        let mut count = |v: u64| {
            let v = i64::try_from(v).unwrap_or(i64::MAX);
            u64::try_from(jitter_count_with(&mut *rng, v, pct)).unwrap_or(0)
        };
        let mut workers = |v: u32| u32::try_from(count(u64::from(v))).unwrap_or(u32::MAX);
        let cpu_workers = workers(self.cpu_workers);
        let cpu_load = workers(self.cpu_load).clamp(1, 100);
        let vm_workers = workers(self.vm_workers);
        let io_workers = workers(self.io_workers);
        Self {
            cpu_workers,
            cpu_load,
            vm_workers,
            vm_bytes: self.vm_bytes.clone(),
            io_workers,
            timeout: count(self.timeout),
            jitter: 0,
        }
    }

    /// Time to wait for the round's shell call.
    pub fn exec_timeout(&self) -> u64 {
        self.timeout.saturating_add(ROUND_TIMEOUT_GRACE_SECS)
    }

    /// `stress-ng` invocation for this round. Stressors with zero workers are
    /// left out.
    pub fn build_command(&self) -> String {
        let mut args = vec!["stress-ng".to_string()];

        if self.cpu_workers > 0 {
            args.push(format!("--cpu {}", self.cpu_workers));
            if (1..=100).contains(&self.cpu_load) {
                args.push(format!("--cpu-load {}", self.cpu_load));
            }
        }

        if self.vm_workers > 0 {
            args.push(format!("--vm {}", self.vm_workers));
            if !self.vm_bytes.is_empty() {
                args.push(format!("--vm-bytes {}", self.vm_bytes));
            }
        }

        if self.io_workers > 0 {
            args.push(format!("--io {}", self.io_workers));
        }

        if self.timeout > 0 {
            args.push(format!("--timeout {}s", self.timeout));
        }

        args.push("--metrics-brief".to_string());
        args.join(" ")
    }
}

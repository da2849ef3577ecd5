use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::time::{Instant, MissedTickBehavior};

use ags_core::api::{
    AppContext, CliError, ConfigError, LoadTestConfig, Outcome, SandboxOrchestrator,
    StressConfig, TaskResult,
};

use super::signal::wait_for_shutdown;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadTestTally {
    pub iterations: u64,
    pub start_failures: u64,
    pub task_results: u64,
    pub task_failures: u64,
    /// Tasks still pending when the teardown gave up.
    pub abandoned: i64,
}

impl LoadTestTally {
    /// A stop or stress round that failed remotely counts as a failure even
    /// though its task body completed.
    fn record<T: Outcome>(&mut self, result: &TaskResult<T>) {
        self.task_results += 1;
        if !result.succeeded() {
            self.task_failures += 1;
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.start_failures > 0 || self.task_failures > 0 || self.abandoned > 0 {
            20
        } else {
            0
        }
    }
}

/// One JSON line per drained task result, tagged with the executor it came from.
pub fn result_line<T: Serialize>(kind: &str, result: &TaskResult<T>) -> Option<String> {
    let mut value = serde_json::to_value(result).ok()?;
    if let Value::Object(map) = &mut value {
        map.insert("kind".to_string(), Value::String(kind.to_string()));
    }
    Some(value.to_string())
}

fn emit<T: Serialize + Outcome>(kind: &str, results: Vec<TaskResult<T>>, tally: &mut LoadTestTally) {
    for result in &results {
        tally.record(result);
        match result_line(kind, result) {
            Some(line) => println!("{line}"),
            None => tracing::warn!(task_id = %result.task_id, "cannot serialize task result"),
        }
    }
}

fn drain(orch: &SandboxOrchestrator, tally: &mut LoadTestTally) {
    emit("stress", orch.take_stress_results(), tally);
    emit("stop", orch.take_stop_results(), tally);
}

/// Rejects malformed stress rounds before any instance is started.
fn check_rounds(cfg: &LoadTestConfig) -> Result<(), ConfigError> {
    for (index, raw) in cfg.stress_rounds.iter().enumerate() {
        StressConfig::from_value(raw).map_err(|e| ConfigError::Invalid {
            field: "loadtest.stress_rounds",
            reason: format!("round {index}: {e}"),
        })?;
    }
    Ok(())
}

async fn iterate(orch: &SandboxOrchestrator, cfg: &LoadTestConfig, tally: &mut LoadTestTally) {
    if cfg.stress {
        let resp = orch.start_instance(cfg.instance_params.clone()).await;
        let Some(instance_id) = resp.instance_id().filter(|_| resp.success) else {
            tally.start_failures += 1;
            tracing::warn!(error = ?resp.error, "start failed");
            return;
        };
        if let Err(e) =
            orch.run_async_stress(instance_id, cfg.port, cfg.stop_after_secs, &cfg.stress_rounds)
        {
            tally.start_failures += 1;
            tracing::error!(instance = %instance_id, error = %e, "cannot schedule stress chain, stopping now");
            let stopped = orch.stop_instance(instance_id).await;
            if !stopped.success {
                tracing::error!(instance = %instance_id, error = ?stopped.error, "stop failed");
            }
        }
    } else {
        let resp = orch
            .start_instance_with_async_stop(cfg.instance_params.clone(), cfg.stop_after_secs)
            .await;
        if !resp.success {
            tally.start_failures += 1;
            tracing::warn!(error = ?resp.error, "start failed");
        }
    }
}

pub async fn run(ctx: &AppContext) -> Result<i32, CliError> {
    ctx.cfg().validate_for_loadtest()?;
    let cfg = ctx.cfg().loadtest.clone();
    if cfg.stress {
        check_rounds(&cfg)?;
    }
    let services = ctx.build_services().await?;
    let orch = ctx.orchestrator(&services);
    let registry = ctx.registry();
    let mut tally = LoadTestTally::default();

    tracing::info!(
        iterations = cfg.iterations,
        interval_ms = cfg.interval_ms,
        stop_after_secs = cfg.stop_after_secs,
        stress = cfg.stress,
        rounds = cfg.stress_rounds.len(),
        "starting load test"
    );

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);
    let mut interrupted = false;

    let mut ticker = tokio::time::interval(Duration::from_millis(cfg.interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    for _ in 0..cfg.iterations {
        tokio::select! {
            biased;
            signal = &mut shutdown => {
                tracing::warn!(signal, "stopping iterations, scheduled stops still run");
                interrupted = true;
                break;
            }
            _ = ticker.tick() => {}
        }
        iterate(&orch, &cfg, &mut tally).await;
        tally.iterations += 1;
        drain(&orch, &mut tally);
    }

    let poll = Duration::from_millis(cfg.drain_poll_ms.max(1));
    let deadline = Instant::now() + Duration::from_secs(cfg.drain_timeout_secs);
    loop {
        drain(&orch, &mut tally);
        let pending = registry.pending_total();
        if pending == 0 {
            drain(&orch, &mut tally);
            break;
        }
        if Instant::now() >= deadline {
            tracing::warn!(pending, "teardown timed out, abandoning pending tasks");
            tally.abandoned = pending;
            break;
        }
        tracing::debug!(pending, "waiting for scheduled tasks");
        tokio::select! {
            biased;
            signal = &mut shutdown, if !interrupted => {
                tracing::warn!(signal, pending, "teardown interrupted, abandoning pending tasks");
                tally.abandoned = pending;
                break;
            }
            _ = tokio::time::sleep(poll) => {}
        }
    }
    registry.release_all();

    tracing::info!(
        iterations = tally.iterations,
        start_failures = tally.start_failures,
        task_results = tally.task_results,
        task_failures = tally.task_failures,
        abandoned = tally.abandoned,
        "load test finished"
    );
    Ok(tally.exit_code())
}

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::cloud::{
    ControlPlane, ControlPlaneResponse, ShellExec, ShellExecRequest, ShellExecResponse,
};
use crate::error::{ChainError, ExecutorError};
use crate::executor::{AsyncTaskExecutor, ExecutorRegistry, TaskResult};

use super::plan::{build_plan, ChainStep};
use super::stress::StressConfig;

pub const STOP_EXECUTOR: &str = "async-stop";
pub const STRESS_EXECUTOR: &str = "async-stress";

/// Sandbox lifecycle operations plus the deferred stop and stress chains built
/// on the shared executors.
///
/// Cheap to clone; chain bodies carry their own clone into the executor.
#[derive(Clone)]
pub struct SandboxOrchestrator {
    control: Arc<dyn ControlPlane>,
    shell: Arc<dyn ShellExec>,
    stops: AsyncTaskExecutor<ControlPlaneResponse>,
    stresses: AsyncTaskExecutor<ShellExecResponse>,
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

impl SandboxOrchestrator {
    pub fn new(
        control: Arc<dyn ControlPlane>,
        shell: Arc<dyn ShellExec>,
        registry: &ExecutorRegistry,
    ) -> Self {
        Self {
            control,
            shell,
            stops: registry.executor::<ControlPlaneResponse>(STOP_EXECUTOR),
            stresses: registry.executor::<ShellExecResponse>(STRESS_EXECUTOR),
        }
    }

    pub async fn start_instance(&self, params: Value) -> ControlPlaneResponse {
        let start = Instant::now();
        match self.control.start_instance(params).await {
            Ok(data) => ControlPlaneResponse::ok(data, elapsed_ms(start)),
            Err(e) => {
                tracing::warn!(error = %e, "start instance failed");
                ControlPlaneResponse::failed(e.to_string(), elapsed_ms(start))
            }
        }
    }

    pub async fn stop_instance(&self, instance_id: &str) -> ControlPlaneResponse {
        let start = Instant::now();
        match self.control.stop_instance(instance_id).await {
            Ok(data) => ControlPlaneResponse::ok(data, elapsed_ms(start)),
            Err(e) => {
                tracing::warn!(instance = %instance_id, error = %e, "stop instance failed");
                ControlPlaneResponse::failed(e.to_string(), elapsed_ms(start))
            }
        }
    }

    pub async fn exec_shell(
        &self,
        instance_id: &str,
        port: u16,
        request: ShellExecRequest,
    ) -> ShellExecResponse {
        let start = Instant::now();
        let mut resp = self.shell.exec(instance_id, port, request).await;
        if resp.timing_ms == 0 {
            resp.timing_ms = elapsed_ms(start);
        }
        if let Some(err) = &resp.error {
            tracing::debug!(instance = %instance_id, error = %err, "shell exec reported an error");
        }
        resp
    }

    fn submit_stop(&self, instance_id: &str, delay_secs: u64) -> Result<(), ExecutorError> {
        let this = self.clone();
        let id = instance_id.to_string();
        self.stops.submit(instance_id, delay_secs, move || async move {
            Ok::<_, Infallible>(this.stop_instance(&id).await)
        })
    }

    /// Starts an instance now and schedules its stop `delay_secs` later.
    ///
    /// No stop is scheduled when the start fails or the response carries no
    /// instance id. If scheduling the stop fails the returned response is
    /// marked failed, since the instance would otherwise leak silently.
    pub async fn start_instance_with_async_stop(
        &self,
        params: Value,
        delay_secs: u64,
    ) -> ControlPlaneResponse {
        let mut resp = self.start_instance(params).await;
        if !resp.success {
            return resp;
        }
        let Some(instance_id) = resp.instance_id().map(str::to_string) else {
            tracing::warn!(request_id = %resp.request_id, "start response has no instance id, stop not scheduled");
            return resp;
        };

        if let Err(e) = self.submit_stop(&instance_id, delay_secs) {
            tracing::error!(instance = %instance_id, error = %e, "failed to schedule stop");
            resp.success = false;
            resp.error = Some(format!("failed to submit stop task: {e}"));
        } else {
            tracing::debug!(instance = %instance_id, delay_secs, "stop scheduled");
        }
        resp
    }

    /// Schedules a stress chain against `instance_id`, starting `delay_secs`
    /// from now.
    ///
    /// Rounds run one after another; every round but the last is published as
    /// its own stress result, the chain's result is the last round's response,
    /// and the instance is stopped once after the last round whatever the
    /// rounds returned.
    pub fn run_async_stress(
        &self,
        instance_id: &str,
        port: u16,
        delay_secs: u64,
        rounds: &[Value],
    ) -> Result<(), ChainError> {
        let configs = rounds
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                StressConfig::from_value(raw)
                    .map(|cfg| cfg.apply_jitter())
                    .map_err(|source| ChainError::InvalidRound { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let plan = build_plan(instance_id, configs);

        let this = self.clone();
        let id = instance_id.to_string();
        self.stresses.submit(instance_id, delay_secs, move || async move {
            Ok::<_, Infallible>(this.run_chain(id, port, plan).await)
        })?;
        tracing::debug!(instance = %instance_id, rounds = rounds.len().max(1), delay_secs, "stress chain scheduled");
        Ok(())
    }

    async fn run_chain(&self, instance_id: String, port: u16, plan: Vec<ChainStep>) -> ShellExecResponse {
        let mut last = ShellExecResponse::default();
        for step in plan {
            match step {
                ChainStep::Round {
                    index,
                    config,
                    publish,
                } => {
                    let request =
                        ShellExecRequest::new(config.build_command(), Some(config.exec_timeout()));
                    let resp = self.exec_shell(&instance_id, port, request).await;
                    tracing::debug!(
                        instance = %instance_id,
                        round = index,
                        success = resp.success,
                        "stress round finished"
                    );
                    if publish {
                        let published = resp.clone();
                        if let Err(e) = self.stresses.submit(instance_id.as_str(), 0, move || async move {
                            Ok::<_, Infallible>(published)
                        }) {
                            tracing::warn!(instance = %instance_id, round = index, error = %e, "failed to publish round result");
                        }
                    }
                    last = resp;
                }
                ChainStep::Stop { instance_id: target } => {
                    if let Err(e) = self.submit_stop(&target, 0) {
                        tracing::error!(instance = %target, error = %e, "failed to schedule stop after stress");
                    }
                }
            }
        }
        last
    }

    pub fn stop_pending_count(&self) -> i64 {
        self.stops.pending_count()
    }

    pub fn take_stop_results(&self) -> Vec<TaskResult<ControlPlaneResponse>> {
        self.stops.take_results()
    }

    pub fn stress_pending_count(&self) -> i64 {
        self.stresses.pending_count()
    }

    pub fn take_stress_results(&self) -> Vec<TaskResult<ShellExecResponse>> {
        self.stresses.take_results()
    }
}

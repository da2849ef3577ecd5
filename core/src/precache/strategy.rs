use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::cloud::{PrecacheApi, PrecacheStatus, ProbeSpec, ProbeToolSpec, ToolStatus};
use crate::error::WarmError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30 * 60);

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);
/// Stand-in deadline when `task_timeout` does not fit on the clock.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

const PROBE_TOOL_CPU: &str = "100m";
const PROBE_TOOL_MEMORY: &str = "256Mi";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmTiming {
    pub poll_interval: Duration,
    pub task_timeout: Duration,
}

impl Default for WarmTiming {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            task_timeout: DEFAULT_TASK_TIMEOUT,
        }
    }
}

/// A way of getting one image onto the sandbox nodes.
#[async_trait]
pub trait WarmStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Warms `image`, returning once it is usable, has failed, timed out, or
    /// `shutdown` flips to `true`.
    async fn warm(&self, image: &str, shutdown: watch::Receiver<bool>) -> Result<(), WarmError>;
}

/// Resolves once the shutdown flag is set. Never resolves if the sender is
/// dropped without setting it.
pub(crate) async fn wait_cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Calls `check` every poll interval (first call one interval in) until it
/// breaks, the timeout passes or shutdown is requested.
async fn poll_until<F, Fut>(
    timing: WarmTiming,
    mut shutdown: watch::Receiver<bool>,
    mut check: F,
) -> Result<(), WarmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ControlFlow<Result<(), WarmError>>>,
{
    let start = Instant::now();
    let deadline = start
        .checked_add(timing.task_timeout)
        .unwrap_or_else(|| start + FAR_FUTURE);
    let poll = timing.poll_interval.max(MIN_POLL_INTERVAL);
    let mut ticker = interval_at(start + poll, poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = sleep_until(deadline) => {
                return Err(WarmError::Timeout(timing.task_timeout.as_secs()));
            }
            _ = wait_cancelled(&mut shutdown) => {
                return Err(WarmError::Cancelled);
            }
            _ = ticker.tick() => {
                if let ControlFlow::Break(outcome) = check().await {
                    return outcome;
                }
            }
        }
    }
}

/// Asks the platform to pre-pull the image and waits for the task to settle.
pub struct PrecacheTaskStrategy {
    api: Arc<dyn PrecacheApi>,
    registry_type: String,
    timing: WarmTiming,
}

impl PrecacheTaskStrategy {
    pub fn new(api: Arc<dyn PrecacheApi>, registry_type: impl Into<String>, timing: WarmTiming) -> Self {
        Self {
            api,
            registry_type: registry_type.into(),
            timing,
        }
    }
}

#[async_trait]
impl WarmStrategy for PrecacheTaskStrategy {
    fn name(&self) -> &'static str {
        "precache"
    }

    async fn warm(&self, image: &str, shutdown: watch::Receiver<bool>) -> Result<(), WarmError> {
        let ticket = self
            .api
            .create_precache_task(image, &self.registry_type)
            .await
            .map_err(WarmError::Create)?;
        tracing::debug!(image = %image, digest = %ticket.image_digest, "precache task created");

        let api = self.api.clone();
        poll_until(self.timing, shutdown, || {
            let api = api.clone();
            let ticket = ticket.clone();
            async move {
                match api.describe_precache_task(&ticket).await {
                    Ok(PrecacheStatus::Success) => ControlFlow::Break(Ok(())),
                    Ok(PrecacheStatus::Failed(message)) => {
                        ControlFlow::Break(Err(WarmError::Failed(message)))
                    }
                    Ok(PrecacheStatus::Pending) => ControlFlow::Continue(()),
                    // Status queries are best effort; the deadline bounds the wait.
                    Err(e) => {
                        tracing::debug!(image = %ticket.image, error = %e, "precache status query failed");
                        ControlFlow::Continue(())
                    }
                }
            }
        })
        .await
    }
}

/// Creates a throwaway sandbox tool from the image and waits for it to pass
/// its readiness probe, which forces every node involved to pull the image.
/// The tool is deleted afterwards whatever happened.
pub struct ProbeToolStrategy {
    api: Arc<dyn PrecacheApi>,
    registry_type: String,
    role_arn: String,
    timing: WarmTiming,
}

impl ProbeToolStrategy {
    pub fn new(
        api: Arc<dyn PrecacheApi>,
        registry_type: impl Into<String>,
        role_arn: impl Into<String>,
        timing: WarmTiming,
    ) -> Self {
        Self {
            api,
            registry_type: registry_type.into(),
            role_arn: role_arn.into(),
            timing,
        }
    }

    fn tool_spec(&self, image: &str) -> ProbeToolSpec {
        ProbeToolSpec {
            name: format!("precache-{}", Uuid::new_v4().simple()),
            image: image.to_string(),
            registry_type: self.registry_type.clone(),
            role_arn: self.role_arn.clone(),
            command: vec!["sleep".to_string()],
            cpu: PROBE_TOOL_CPU.to_string(),
            memory: PROBE_TOOL_MEMORY.to_string(),
            probe: ProbeSpec::default(),
        }
    }

    async fn wait_active(&self, tool_id: &str, shutdown: watch::Receiver<bool>) -> Result<(), WarmError> {
        let api = self.api.clone();
        poll_until(self.timing, shutdown, || {
            let api = api.clone();
            let tool_id = tool_id.to_string();
            async move {
                match api.tool_status(&tool_id).await {
                    Ok(ToolStatus::Active) => ControlFlow::Break(Ok(())),
                    Ok(ToolStatus::Creating) => ControlFlow::Continue(()),
                    Ok(ToolStatus::Failed) => {
                        ControlFlow::Break(Err(WarmError::Failed("tool creation failed".into())))
                    }
                    Ok(ToolStatus::Deleting) => ControlFlow::Break(Err(WarmError::Failed(
                        "unexpected tool status: DELETING".into(),
                    ))),
                    Ok(ToolStatus::Other(status)) => ControlFlow::Break(Err(WarmError::Failed(
                        format!("unexpected tool status: {status}"),
                    ))),
                    Err(e) => ControlFlow::Break(Err(WarmError::Status(e))),
                }
            }
        })
        .await
    }
}

#[async_trait]
impl WarmStrategy for ProbeToolStrategy {
    fn name(&self) -> &'static str {
        "sandboxtool"
    }

    async fn warm(&self, image: &str, shutdown: watch::Receiver<bool>) -> Result<(), WarmError> {
        let spec = self.tool_spec(image);
        let tool_id = self
            .api
            .create_probe_tool(&spec)
            .await
            .map_err(WarmError::Create)?;
        tracing::debug!(image = %image, tool = %spec.name, tool_id = %tool_id, "probe tool created");

        let outcome = self.wait_active(&tool_id, shutdown).await;

        match self.api.delete_tool(&tool_id).await {
            Ok(()) => tracing::info!(tool_id = %tool_id, "probe tool deleted"),
            Err(e) => tracing::warn!(tool_id = %tool_id, error = %e, "failed to delete probe tool"),
        }
        outcome
    }
}

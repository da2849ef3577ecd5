use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use crate::error::PrecacheError;
use crate::progress::{ProgressSink, TaskStatus};

use super::catalog::{ImageCatalog, ImageFilter};
use super::strategy::{wait_cancelled, WarmStrategy};

pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecacheOptions {
    pub concurrency: usize,
    pub max_retries: u32,
}

impl Default for PrecacheOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Outcome of a whole pre-cache run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrecacheReport {
    /// Distinct images admitted by the filter.
    pub submitted: usize,
    pub succeeded: usize,
    /// Images that failed their last allowed attempt.
    pub permanently_failed: Vec<String>,
    /// Images left cold by a shutdown while retries were still allowed.
    pub abandoned: Vec<String>,
    /// Warm attempts, first tries and retries together.
    pub attempts: usize,
    /// Set when the run stopped early on shutdown.
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RetryRecord {
    image: String,
    retry_count: u32,
}

/// State of one `run`; nothing carries over to the next call.
#[derive(Default)]
struct RunState {
    retry_queue: Mutex<Vec<RetryRecord>>,
    attempts: AtomicUsize,
    succeeded: AtomicUsize,
}

impl RunState {
    fn take_queue(&self) -> Vec<RetryRecord> {
        let mut queue = self.retry_queue.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *queue)
    }
}

/// Warms every image of a registry namespace with bounded concurrency, then
/// retries failures round by round.
///
/// `run` and `shutdown` take `&self`, so the CLI keeps the precacher in an
/// `Arc` and calls `shutdown` from its signal handler. Shutdown is one-way:
/// later runs return immediately as cancelled.
pub struct Precacher {
    catalog: ImageCatalog,
    filter: ImageFilter,
    strategy: Arc<dyn WarmStrategy>,
    progress: Arc<dyn ProgressSink>,
    options: PrecacheOptions,
    slots: Arc<Semaphore>,
    shutdown_tx: watch::Sender<bool>,
}

impl Precacher {
    pub fn new(
        catalog: ImageCatalog,
        filter: ImageFilter,
        strategy: Arc<dyn WarmStrategy>,
        progress: Arc<dyn ProgressSink>,
        mut options: PrecacheOptions,
    ) -> Self {
        if options.concurrency == 0 {
            options.concurrency = DEFAULT_CONCURRENCY;
        }
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            catalog,
            filter,
            strategy,
            progress,
            slots: Arc::new(Semaphore::new(options.concurrency)),
            options,
            shutdown_tx,
        }
    }

    /// Stops new submissions and retry rounds and wakes every status poll.
    /// Remote calls already in flight are left to finish.
    pub fn shutdown(&self) {
        if !self.shutdown_tx.send_replace(true) {
            tracing::info!("precache shutdown requested");
        }
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    pub async fn run(&self) -> Result<PrecacheReport, PrecacheError> {
        let result = self.run_inner().await;
        self.progress.quit();
        result
    }

    async fn run_inner(&self) -> Result<PrecacheReport, PrecacheError> {
        tracing::info!(
            strategy = self.strategy.name(),
            namespace = %self.catalog.namespace(),
            concurrency = self.options.concurrency,
            max_retries = self.options.max_retries,
            "starting precache"
        );

        let registry_name = self
            .catalog
            .registry_name()
            .await
            .map_err(PrecacheError::Catalog)?;

        let state = Arc::new(RunState::default());
        let mut report = PrecacheReport::default();
        let mut in_flight = JoinSet::new();

        self.first_pass(&registry_name, &state, &mut in_flight, &mut report)
            .await;
        drain(&mut in_flight).await;

        for round in 1.. {
            if self.is_shutdown() {
                break;
            }
            let records = state.take_queue();
            if records.is_empty() {
                break;
            }
            tracing::info!(round, count = records.len(), "retrying failed images");

            let mut records = records.into_iter();
            while let Some(record) = records.next() {
                if record.retry_count >= self.options.max_retries {
                    self.give_up(record, &mut report);
                    continue;
                }
                let image = record.image.clone();
                if !self
                    .submit(&state, &mut in_flight, record.image, record.retry_count + 1)
                    .await
                {
                    report.abandoned.push(image);
                    self.settle(records, &mut report);
                    break;
                }
            }
            drain(&mut in_flight).await;
        }
        // failures of attempts that ran into the shutdown
        self.settle(state.take_queue().into_iter(), &mut report);

        report.attempts = state.attempts.load(Ordering::SeqCst);
        report.succeeded = state.succeeded.load(Ordering::SeqCst);
        report.cancelled = self.is_shutdown();
        if !report.abandoned.is_empty() {
            tracing::warn!(
                count = report.abandoned.len(),
                images = ?report.abandoned,
                "shutdown left images cold"
            );
        }
        tracing::info!(
            submitted = report.submitted,
            succeeded = report.succeeded,
            failed = report.permanently_failed.len(),
            abandoned = report.abandoned.len(),
            attempts = report.attempts,
            cancelled = report.cancelled,
            "precache finished"
        );
        Ok(report)
    }

    fn give_up(&self, record: RetryRecord, report: &mut PrecacheReport) {
        tracing::warn!(
            image = %record.image,
            retry_count = record.retry_count,
            "giving up on image after max retries"
        );
        report.permanently_failed.push(record.image);
    }

    /// Sorts records that will not be retried into given-up and abandoned.
    fn settle(&self, records: impl Iterator<Item = RetryRecord>, report: &mut PrecacheReport) {
        for record in records {
            if record.retry_count >= self.options.max_retries {
                self.give_up(record, report);
            } else {
                report.abandoned.push(record.image);
            }
        }
    }

    /// Walks the catalog and submits every image the filter admits. A listing
    /// error ends the walk; whatever was submitted still runs.
    async fn first_pass(
        &self,
        registry_name: &str,
        state: &Arc<RunState>,
        in_flight: &mut JoinSet<()>,
        report: &mut PrecacheReport,
    ) {
        let mut repositories = self.catalog.repositories();

        while let Some(repo) = repositories.next().await {
            let repo = match repo {
                Ok(repo) => repo,
                Err(e) => {
                    tracing::error!(error = %e, "listing repositories failed");
                    return;
                }
            };
            let short = self.catalog.short_repository_name(&repo.name).to_string();

            let mut images = self.catalog.images(&short);
            while let Some(image) = images.next().await {
                let image = match image {
                    Ok(image) => image,
                    Err(e) => {
                        tracing::error!(repo = %short, error = %e, "listing images failed");
                        return;
                    }
                };
                let image_ref = self.catalog.image_ref(registry_name, &short, &image.version);
                if !self.filter.matches(&image_ref) {
                    tracing::trace!(image = %image_ref, "skipped by filter");
                    continue;
                }
                if !self.submit(state, in_flight, image_ref.clone(), 0).await {
                    report.abandoned.push(image_ref);
                    return;
                }
                report.submitted += 1;
            }
        }
    }

    /// Waits for a free slot, then launches one warm attempt. Returns `false`
    /// when shutdown arrived first.
    async fn submit(
        &self,
        state: &Arc<RunState>,
        in_flight: &mut JoinSet<()>,
        image: String,
        retry_count: u32,
    ) -> bool {
        let mut shutdown = self.shutdown_tx.subscribe();
        let permit = tokio::select! {
            biased;
            _ = wait_cancelled(&mut shutdown) => return false,
            permit = self.slots.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return false,
            },
        };

        let label = if retry_count > 0 {
            format!("{image} (retry {retry_count})")
        } else {
            image.clone()
        };
        self.progress.task_added(&image, &label);

        let strategy = self.strategy.clone();
        let progress = self.progress.clone();
        let state = state.clone();
        in_flight.spawn(async move {
            let _permit = permit;
            state.attempts.fetch_add(1, Ordering::SeqCst);

            match strategy.warm(&image, shutdown).await {
                Ok(()) => {
                    tracing::info!(image = %image, retry = retry_count, "image warmed");
                    state.succeeded.fetch_add(1, Ordering::SeqCst);
                    progress.task_updated(&image, TaskStatus::Success, "");
                }
                Err(e) => {
                    tracing::error!(image = %image, retry = retry_count, error = %e, "warming image failed");
                    progress.task_updated(&image, TaskStatus::Failed, &e.to_string());
                    let mut queue = state.retry_queue.lock().unwrap_or_else(|e| e.into_inner());
                    queue.push(RetryRecord { image, retry_count });
                }
            }
        });
        true
    }
}

async fn drain(in_flight: &mut JoinSet<()>) {
    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "warm task aborted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{ImageVersion, Page, RegistryCatalog, RegistryInfo, Repository};
    use crate::error::{CloudError, WarmError};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::time::Duration;

    /// One repository `ns/app` holding versions `0..count`.
    struct FlatCatalog {
        count: usize,
    }

    #[async_trait]
    impl RegistryCatalog for FlatCatalog {
        async fn describe_registry(&self, registry_id: &str) -> Result<RegistryInfo, CloudError> {
            Ok(RegistryInfo {
                registry_id: registry_id.to_string(),
                name: "reg".to_string(),
            })
        }

        async fn list_repositories(
            &self,
            _registry_id: &str,
            _namespace: &str,
            _page: u64,
            _page_size: u64,
        ) -> Result<Page<Repository>, CloudError> {
            Ok(Page {
                items: vec![Repository {
                    name: "ns/app".to_string(),
                }],
                total_count: Some(1),
            })
        }

        async fn list_images(
            &self,
            _registry_id: &str,
            _namespace: &str,
            _repository: &str,
            page: u64,
            page_size: u64,
        ) -> Result<Page<ImageVersion>, CloudError> {
            let start = ((page - 1) * page_size) as usize;
            let end = (start + page_size as usize).min(self.count);
            Ok(Page {
                items: (start..end)
                    .map(|i| ImageVersion {
                        version: i.to_string(),
                    })
                    .collect(),
                total_count: Some(self.count as u64),
            })
        }
    }

    /// Fails every image whose tag is listed, counts attempts per image and
    /// tracks the highest observed concurrency.
    #[derive(Default)]
    struct FlakyWarm {
        failing: Vec<String>,
        attempts: Mutex<HashMap<String, usize>>,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl WarmStrategy for FlakyWarm {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn warm(&self, image: &str, _shutdown: watch::Receiver<bool>) -> Result<(), WarmError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            *self
                .attempts
                .lock()
                .unwrap()
                .entry(image.to_string())
                .or_default() += 1;
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            let tag = image.rsplit(':').next().unwrap_or_default();
            if self.failing.iter().any(|f| f == tag) {
                Err(WarmError::Failed("pull failed".into()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        labels: Mutex<Vec<String>>,
        quits: AtomicUsize,
    }

    impl ProgressSink for RecordingSink {
        fn task_added(&self, _id: &str, label: &str) {
            self.labels.lock().unwrap().push(label.to_string());
        }
        fn task_updated(&self, _id: &str, _status: TaskStatus, _message: &str) {}
        fn quit(&self) {
            self.quits.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn precacher(
        count: usize,
        filter: Option<&str>,
        warm: Arc<FlakyWarm>,
        sink: Arc<RecordingSink>,
        options: PrecacheOptions,
    ) -> Precacher {
        let catalog = ImageCatalog::new(Arc::new(FlatCatalog { count }), "tcr-1", "ns", "example.com")
            .with_page_size(4);
        Precacher::new(
            catalog,
            ImageFilter::compile(filter).unwrap(),
            warm,
            sink,
            options,
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failing_items_get_all_retries() {
        let warm = Arc::new(FlakyWarm {
            failing: vec!["3".into(), "7".into()],
            ..Default::default()
        });
        let sink = Arc::new(RecordingSink::default());
        let p = precacher(
            10,
            None,
            warm.clone(),
            sink.clone(),
            PrecacheOptions {
                concurrency: 2,
                max_retries: 3,
            },
        );

        let report = p.run().await.unwrap();

        let attempts = warm.attempts.lock().unwrap().clone();
        assert_eq!(attempts.len(), 10);
        for (image, n) in &attempts {
            let expected = if image.ends_with(":3") || image.ends_with(":7") { 4 } else { 1 };
            assert_eq!(*n, expected, "{image}");
        }
        assert!(warm.peak.load(Ordering::SeqCst) <= 2);

        let mut failed = report.permanently_failed.clone();
        failed.sort();
        assert_eq!(
            failed,
            vec!["reg.example.com/ns/app:3", "reg.example.com/ns/app:7"]
        );
        assert_eq!(report.submitted, 10);
        assert_eq!(report.succeeded, 8);
        assert_eq!(report.attempts, 16);
        assert!(!report.cancelled);
        assert_eq!(sink.quits.load(Ordering::SeqCst), 1);
        assert!(sink
            .labels
            .lock()
            .unwrap()
            .contains(&"reg.example.com/ns/app:3 (retry 3)".to_string()));
    }

    #[tokio::test]
    async fn test_filter_limits_submissions() {
        let warm = Arc::new(FlakyWarm::default());
        let sink = Arc::new(RecordingSink::default());
        let p = precacher(12, Some(r":1\d$"), warm.clone(), sink, PrecacheOptions::default());
        let report = p.run().await.unwrap();
        assert_eq!(report.submitted, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(warm.attempts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_max_retries_never_retries() {
        let warm = Arc::new(FlakyWarm {
            failing: vec!["0".into()],
            ..Default::default()
        });
        let p = precacher(
            1,
            None,
            warm.clone(),
            Arc::new(RecordingSink::default()),
            PrecacheOptions {
                concurrency: 1,
                max_retries: 0,
            },
        );
        let report = p.run().await.unwrap();
        assert_eq!(report.attempts, 1);
        assert_eq!(report.permanently_failed.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_before_run_submits_nothing() {
        let warm = Arc::new(FlakyWarm::default());
        let sink = Arc::new(RecordingSink::default());
        let p = precacher(5, None, warm.clone(), sink.clone(), PrecacheOptions::default());
        p.shutdown();
        p.shutdown();
        let report = p.run().await.unwrap();
        assert_eq!(report.submitted, 0);
        assert_eq!(report.abandoned, vec!["reg.example.com/ns/app:0"]);
        assert!(report.cancelled);
        assert!(warm.attempts.lock().unwrap().is_empty());
        assert_eq!(sink.quits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeated_runs_report_independently() {
        let warm = Arc::new(FlakyWarm {
            failing: vec!["1".into()],
            ..Default::default()
        });
        let p = precacher(
            2,
            None,
            warm,
            Arc::new(RecordingSink::default()),
            PrecacheOptions {
                concurrency: 2,
                max_retries: 1,
            },
        );
        let first = p.run().await.unwrap();
        let second = p.run().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second.attempts, 3);
        assert_eq!(second.permanently_failed, vec!["reg.example.com/ns/app:1"]);
    }

    /// Fails `:1` and `:2`. The first retry of `:1` blocks until shutdown.
    #[derive(Default)]
    struct StallOnRetry {
        attempts: Mutex<HashMap<String, usize>>,
        retrying: tokio::sync::Notify,
    }

    #[async_trait]
    impl WarmStrategy for StallOnRetry {
        fn name(&self) -> &'static str {
            "stall"
        }

        async fn warm(&self, image: &str, mut shutdown: watch::Receiver<bool>) -> Result<(), WarmError> {
            let n = {
                let mut attempts = self.attempts.lock().unwrap();
                let n = attempts.entry(image.to_string()).or_default();
                *n += 1;
                *n
            };
            if image.ends_with(":1") && n == 2 {
                self.retrying.notify_one();
                wait_cancelled(&mut shutdown).await;
                return Err(WarmError::Cancelled);
            }
            if image.ends_with(":1") || image.ends_with(":2") {
                return Err(WarmError::Failed("pull failed".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_shutdown_during_retries_reports_abandoned_images() {
        let warm = Arc::new(StallOnRetry::default());
        let catalog = ImageCatalog::new(Arc::new(FlatCatalog { count: 3 }), "tcr-1", "ns", "example.com");
        let p = Arc::new(Precacher::new(
            catalog,
            ImageFilter::default(),
            warm.clone(),
            Arc::new(RecordingSink::default()),
            PrecacheOptions {
                concurrency: 1,
                max_retries: 3,
            },
        ));

        let run = tokio::spawn({
            let p = p.clone();
            async move { p.run().await }
        });
        warm.retrying.notified().await;
        p.shutdown();
        let report = run.await.unwrap().unwrap();

        assert!(report.cancelled);
        assert!(report.permanently_failed.is_empty());
        let mut abandoned = report.abandoned.clone();
        abandoned.sort();
        assert_eq!(
            abandoned,
            vec!["reg.example.com/ns/app:1", "reg.example.com/ns/app:2"]
        );
        assert_eq!(report.submitted, 3);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.attempts, 4);
    }

    struct MissingRegistry;

    #[async_trait]
    impl RegistryCatalog for MissingRegistry {
        async fn describe_registry(&self, _registry_id: &str) -> Result<RegistryInfo, CloudError> {
            Err(CloudError::not_found("registry 'tcr-x' not found"))
        }

        async fn list_repositories(
            &self,
            _registry_id: &str,
            _namespace: &str,
            _page: u64,
            _page_size: u64,
        ) -> Result<Page<Repository>, CloudError> {
            unreachable!()
        }

        async fn list_images(
            &self,
            _registry_id: &str,
            _namespace: &str,
            _repository: &str,
            _page: u64,
            _page_size: u64,
        ) -> Result<Page<ImageVersion>, CloudError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_registry_lookup_failure_is_fatal() {
        let sink = Arc::new(RecordingSink::default());
        let p = Precacher::new(
            ImageCatalog::new(Arc::new(MissingRegistry), "tcr-x", "ns", "example.com"),
            ImageFilter::default(),
            Arc::new(FlakyWarm::default()),
            sink.clone(),
            PrecacheOptions::default(),
        );
        assert!(matches!(p.run().await, Err(PrecacheError::Catalog(_))));
        assert_eq!(sink.quits.load(Ordering::SeqCst), 1);
    }
}

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;

use crate::error::ExecutorError;
use crate::jitter::{jitter_delay, DEFAULT_DELAY_JITTER_PCT};

use super::pool::{SpawnError, WorkerPool};
use super::result::TaskResult;

/// Effectively unbounded for load-test workloads.
pub const DEFAULT_POOL_SIZE: usize = 100_000;

#[derive(Debug, Clone, Copy)]
pub struct ExecutorOptions {
    pub pool_size: usize,
    /// Jitter applied to non-zero submission delays.
    pub delay_jitter_pct: u32,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            delay_jitter_pct: DEFAULT_DELAY_JITTER_PCT,
        }
    }
}

/// Named executor running result-producing tasks in the background.
///
/// Cloning is cheap and yields a handle to the same pool, buffer and counter.
pub struct AsyncTaskExecutor<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    name: String,
    options: ExecutorOptions,
    pool: OnceLock<Result<WorkerPool, String>>,
    released: AtomicBool,
    results: Mutex<Vec<TaskResult<T>>>,
    pending: AtomicI64,
}

impl<T> Clone for AsyncTaskExecutor<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Inner<T> {
    fn push(&self, result: TaskResult<T>) {
        let mut results = self.results.lock().unwrap_or_else(|e| e.into_inner());
        results.push(result);
    }
}

impl<T: Send + 'static> AsyncTaskExecutor<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_options(name, ExecutorOptions::default())
    }

    pub fn with_options(name: impl Into<String>, mut options: ExecutorOptions) -> Self {
        if options.pool_size == 0 {
            options.pool_size = DEFAULT_POOL_SIZE;
        }
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                options,
                pool: OnceLock::new(),
                released: AtomicBool::new(false),
                results: Mutex::new(Vec::new()),
                pending: AtomicI64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn pool_size(&self) -> usize {
        self.inner.options.pool_size
    }

    /// The pool is created on first use. A creation failure is remembered: the
    /// executor stays unavailable for the rest of its life.
    fn pool(&self) -> Result<&WorkerPool, ExecutorError> {
        let created = self.inner.pool.get_or_init(|| {
            let pool = WorkerPool::new(self.inner.options.pool_size);
            match &pool {
                Ok(p) => tracing::debug!(
                    executor = %self.inner.name,
                    capacity = p.capacity(),
                    "worker pool created"
                ),
                Err(reason) => tracing::error!(
                    executor = %self.inner.name,
                    reason = %reason,
                    "worker pool creation failed"
                ),
            }
            pool
        });
        created
            .as_ref()
            .map_err(|reason| ExecutorError::PoolUnavailable {
                name: self.inner.name.clone(),
                reason: reason.clone(),
            })
    }

    /// Schedules `task_fn` to run after `delay_secs` (jittered; `0` runs it
    /// immediately).
    ///
    /// The task body's error is never returned here; it is recorded on the
    /// task's [`TaskResult`]. This only fails when the task could not be
    /// admitted at all.
    pub fn submit<F, Fut, E>(
        &self,
        task_id: impl Into<String>,
        delay_secs: u64,
        task_fn: F,
    ) -> Result<(), ExecutorError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let task_id = task_id.into();
        if self.inner.released.load(Ordering::Acquire) {
            return Err(ExecutorError::Released {
                name: self.inner.name.clone(),
            });
        }
        let pool = self.pool()?;
        let delay = jitter_delay(delay_secs, self.inner.options.delay_jitter_pct);

        self.inner.pending.fetch_add(1, Ordering::SeqCst);

        let inner = self.inner.clone();
        let id = task_id.clone();
        let spawned = pool.try_spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let started_at = Utc::now();
            let outcome = AssertUnwindSafe(async move { task_fn().await })
                .catch_unwind()
                .await;
            let ended_at = Utc::now();

            let result = match outcome {
                Ok(outcome) => TaskResult::from_outcome(id, outcome, started_at, ended_at),
                Err(_) => {
                    tracing::error!(executor = %inner.name, task_id = %id, "task panicked");
                    TaskResult::new(
                        id,
                        None,
                        Some("task panicked".to_string()),
                        started_at,
                        ended_at,
                    )
                }
            };

            inner.push(result);
            inner.pending.fetch_sub(1, Ordering::SeqCst);
        });

        match spawned {
            Ok(()) => {
                tracing::trace!(
                    executor = %self.inner.name,
                    task_id = %task_id,
                    delay_ms = delay.as_millis() as u64,
                    "task submitted"
                );
                Ok(())
            }
            Err(e) => {
                self.inner.pending.fetch_sub(1, Ordering::SeqCst);
                Err(match e {
                    SpawnError::Full => ExecutorError::Rejected {
                        name: self.inner.name.clone(),
                        task_id,
                        capacity: pool.capacity(),
                    },
                    SpawnError::Closed => ExecutorError::Released {
                        name: self.inner.name.clone(),
                    },
                })
            }
        }
    }

    /// Tasks submitted but not yet buffered (queued, delayed or running).
    pub fn pending_count(&self) -> i64 {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Hands over every result completed so far and leaves the buffer empty.
    ///
    /// Concurrent callers never see the same result twice.
    pub fn take_results(&self) -> Vec<TaskResult<T>> {
        let mut results = self.inner.results.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *results)
    }

    /// Polls until nothing is pending or `timeout` elapses. Returns whether the
    /// executor went idle.
    pub async fn wait_idle(&self, poll: Duration, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.pending_count() == 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Stops admitting new tasks. Already admitted tasks run to completion and
    /// their results stay collectable. Idempotent.
    pub fn release(&self) {
        if self.inner.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(Ok(pool)) = self.inner.pool.get() {
            pool.close();
        }
        tracing::debug!(
            executor = %self.inner.name,
            pending = self.pending_count(),
            "executor released"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tokio::sync::oneshot;

    fn executor(name: &str) -> AsyncTaskExecutor<String> {
        AsyncTaskExecutor::new(name)
    }

    const POLL: Duration = Duration::from_millis(5);
    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_submit_records_result() {
        let ex = executor("t");
        ex.submit("task-1", 0, || async { Ok::<_, String>("done".to_string()) })
            .unwrap();
        assert!(ex.wait_idle(POLL, WAIT).await);

        let results = ex.take_results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].task_id, "task-1");
        assert_eq!(results[0].result.as_deref(), Some("done"));
        assert!(results[0].error.is_none());
        assert!(results[0].ended_at >= results[0].started_at);
    }

    #[tokio::test]
    async fn test_task_error_is_stringified() {
        let ex = executor("t");
        ex.submit("bad", 0, || async { Err::<String, _>("remote exploded") })
            .unwrap();
        assert!(ex.wait_idle(POLL, WAIT).await);
        let results = ex.take_results();
        assert_eq!(results[0].result, None);
        assert_eq!(results[0].error.as_deref(), Some("remote exploded"));
    }

    #[tokio::test]
    async fn test_panicking_task_still_completes() {
        let ex = executor("t");
        ex.submit("boom", 0, || async {
            if true {
                panic!("kaboom");
            }
            Ok::<String, String>(String::new())
        })
        .unwrap();
        assert!(ex.wait_idle(POLL, WAIT).await);
        let results = ex.take_results();
        assert_eq!(results[0].error.as_deref(), Some("task panicked"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pending_converges_to_zero() {
        let ex = executor("t");
        let n = 64;
        for i in 0..n {
            ex.submit(format!("task-{i}"), 0, move || async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, String>(i.to_string())
            })
            .unwrap();
        }
        assert!(ex.pending_count() <= n);
        assert!(ex.pending_count() >= 0);
        assert!(ex.wait_idle(POLL, WAIT).await);
        assert_eq!(ex.pending_count(), 0);
        assert_eq!(ex.take_results().len(), n as usize);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_first_submits_share_one_pool() {
        let ex = executor("fresh");
        let n: i64 = 256;
        let start = Arc::new(tokio::sync::Barrier::new(n as usize));

        let mut submitters = Vec::new();
        for i in 0..n {
            let ex = ex.clone();
            let start = start.clone();
            submitters.push(tokio::spawn(async move {
                start.wait().await;
                let submitted = ex.submit(format!("task-{i}"), 0, move || async move {
                    tokio::task::yield_now().await;
                    Ok::<_, String>(i.to_string())
                });
                let pending = ex.pending_count();
                (submitted, pending)
            }));
        }

        for s in submitters {
            let (submitted, pending) = s.await.unwrap();
            assert!(submitted.is_ok());
            assert!((0..=n).contains(&pending));
        }
        assert!(ex.inner.pool.get().is_some_and(|p| p.is_ok()));

        assert!(ex.wait_idle(POLL, WAIT).await);
        assert_eq!(ex.pending_count(), 0);
        let ids: HashSet<_> = ex.take_results().into_iter().map(|r| r.task_id).collect();
        assert_eq!(ids.len(), n as usize);
        assert!(ex.take_results().is_empty());
    }

    #[tokio::test]
    async fn test_pending_counts_running_tasks() {
        let ex = executor("t");
        let (tx, rx) = oneshot::channel::<()>();
        ex.submit("blocked", 0, move || async move {
            let _ = rx.await;
            Ok::<_, String>("released".to_string())
        })
        .unwrap();
        tokio::task::yield_now().await;
        assert_eq!(ex.pending_count(), 1);
        assert!(ex.take_results().is_empty());

        tx.send(()).unwrap();
        assert!(ex.wait_idle(POLL, WAIT).await);
        assert_eq!(ex.take_results().len(), 1);
    }

    #[tokio::test]
    async fn test_second_drain_is_empty() {
        let ex = executor("t");
        for i in 0..3 {
            ex.submit(format!("t{i}"), 0, || async { Ok::<_, String>(String::new()) })
                .unwrap();
        }
        assert!(ex.wait_idle(POLL, WAIT).await);
        assert_eq!(ex.take_results().len(), 3);
        assert!(ex.take_results().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_drains_never_duplicate_or_lose() {
        let ex = executor("t");
        let n = 500;
        for i in 0..n {
            ex.submit(format!("{i}"), 0, move || async move {
                Ok::<_, String>(i.to_string())
            })
            .unwrap();
        }

        let mut drainers = Vec::new();
        for _ in 0..8 {
            let ex = ex.clone();
            drainers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..50 {
                    seen.extend(ex.take_results().into_iter().map(|r| r.task_id));
                    tokio::task::yield_now().await;
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for d in drainers {
            all.extend(d.await.unwrap());
        }
        assert!(ex.wait_idle(POLL, WAIT).await);
        all.extend(ex.take_results().into_iter().map(|r| r.task_id));

        let unique: HashSet<_> = all.iter().cloned().collect();
        assert_eq!(all.len(), n);
        assert_eq!(unique.len(), n);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_is_applied_with_jitter() {
        let ex = executor("t");
        ex.submit("later", 10, || async { Ok::<_, String>(String::new()) })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(7_900)).await;
        assert_eq!(ex.pending_count(), 1);
        assert!(ex.take_results().is_empty());

        tokio::time::sleep(Duration::from_millis(4_200)).await;
        assert_eq!(ex.pending_count(), 0);
        assert_eq!(ex.take_results().len(), 1);
    }

    #[tokio::test]
    async fn test_capacity_rejection_rolls_back_pending() {
        let ex: AsyncTaskExecutor<String> = AsyncTaskExecutor::with_options(
            "tiny",
            ExecutorOptions {
                pool_size: 1,
                delay_jitter_pct: 0,
            },
        );
        let (tx, rx) = oneshot::channel::<()>();
        ex.submit("first", 0, move || async move {
            let _ = rx.await;
            Ok::<_, String>(String::new())
        })
        .unwrap();

        let err = ex
            .submit("second", 0, || async { Ok::<_, String>(String::new()) })
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Rejected { capacity: 1, .. }));
        assert_eq!(ex.pending_count(), 1);

        tx.send(()).unwrap();
        assert!(ex.wait_idle(POLL, WAIT).await);
    }

    #[tokio::test]
    async fn test_release_is_idempotent_and_blocks_submission() {
        let never_used = executor("unused");
        never_used.release();
        never_used.release();

        let ex = executor("t");
        ex.submit("a", 0, || async { Ok::<_, String>(String::new()) })
            .unwrap();
        ex.release();
        ex.release();
        let err = ex
            .submit("b", 0, || async { Ok::<_, String>(String::new()) })
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Released { .. }));

        assert!(ex.wait_idle(POLL, WAIT).await);
        assert_eq!(ex.take_results().len(), 1);
    }

    #[test]
    fn test_pool_failure_is_surfaced_and_sticky() {
        let ex = executor("no-runtime");
        for _ in 0..2 {
            let err = ex
                .submit("a", 0, || async { Ok::<_, String>(String::new()) })
                .unwrap_err();
            assert!(matches!(err, ExecutorError::PoolUnavailable { .. }));
        }
        assert_eq!(ex.pending_count(), 0);
    }
}

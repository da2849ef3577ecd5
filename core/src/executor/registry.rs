use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::async_task::{AsyncTaskExecutor, ExecutorOptions};

/// Type-erased view of an executor, used for bulk teardown and reporting.
pub trait ExecutorHandle: Send + Sync {
    fn name(&self) -> &str;
    fn pending_count(&self) -> i64;
    fn release(&self);
}

impl<T: Send + 'static> ExecutorHandle for AsyncTaskExecutor<T> {
    fn name(&self) -> &str {
        AsyncTaskExecutor::name(self)
    }

    fn pending_count(&self) -> i64 {
        AsyncTaskExecutor::pending_count(self)
    }

    fn release(&self) {
        AsyncTaskExecutor::release(self)
    }
}

struct Slot {
    executor: Box<dyn Any + Send + Sync>,
    handle: Arc<dyn ExecutorHandle>,
}

/// Owns at most one executor per result type.
///
/// Shared through `Arc` by everything that submits work; tests build their own
/// registry so executors never leak between cases.
pub struct ExecutorRegistry {
    options: ExecutorOptions,
    slots: Mutex<HashMap<TypeId, Slot>>,
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new(ExecutorOptions::default())
    }
}

impl ExecutorRegistry {
    pub fn new(options: ExecutorOptions) -> Self {
        Self {
            options,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the executor for `T`, creating it on first request.
    ///
    /// `name` only matters for the call that creates the executor.
    pub fn executor<T: Send + 'static>(&self, name: &str) -> AsyncTaskExecutor<T> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let slot = slots.entry(TypeId::of::<T>()).or_insert_with(|| {
            let executor = AsyncTaskExecutor::<T>::with_options(name, self.options);
            tracing::debug!(executor = %name, pool_size = executor.pool_size(), "executor registered");
            Slot {
                handle: Arc::new(executor.clone()),
                executor: Box::new(executor),
            }
        });
        match slot.executor.downcast_ref::<AsyncTaskExecutor<T>>() {
            Some(executor) => executor.clone(),
            // Slots are keyed by `TypeId::of::<T>()`, so the downcast cannot miss.
            None => unreachable!("executor slot type mismatch"),
        }
    }

    pub fn handles(&self) -> Vec<Arc<dyn ExecutorHandle>> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.values().map(|s| s.handle.clone()).collect()
    }

    pub fn pending_total(&self) -> i64 {
        self.handles().iter().map(|h| h.pending_count()).sum()
    }

    /// Releases every executor created so far. Idempotent.
    pub fn release_all(&self) {
        for handle in self.handles() {
            handle.release();
        }
    }
}

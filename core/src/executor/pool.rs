use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{Semaphore, TryAcquireError};

/// Fixed-capacity set of execution slots on a Tokio runtime.
///
/// A slot is taken at submission and given back when the task finishes, so the
/// number of admitted-but-unfinished tasks never exceeds `capacity`. Submissions
/// beyond capacity are rejected rather than queued.
pub(crate) struct WorkerPool {
    handle: Handle,
    slots: Arc<Semaphore>,
    capacity: usize,
}

pub(crate) enum SpawnError {
    Full,
    Closed,
}

impl WorkerPool {
    /// Binds to the runtime of the calling context.
    pub(crate) fn new(capacity: usize) -> Result<Self, String> {
        if capacity == 0 {
            return Err("pool size must be positive".to_string());
        }
        if capacity > Semaphore::MAX_PERMITS {
            return Err(format!(
                "pool size {} exceeds the maximum of {}",
                capacity,
                Semaphore::MAX_PERMITS
            ));
        }
        let handle = Handle::try_current().map_err(|e| format!("no tokio runtime: {e}"))?;
        Ok(Self {
            handle,
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn try_spawn<F>(&self, fut: F) -> Result<(), SpawnError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = self
            .slots
            .clone()
            .try_acquire_owned()
            .map_err(|e| match e {
                TryAcquireError::Closed => SpawnError::Closed,
                TryAcquireError::NoPermits => SpawnError::Full,
            })?;
        self.handle.spawn(async move {
            let _permit = permit;
            fut.await;
        });
        Ok(())
    }

    /// Stops admitting work. Running tasks keep their slots until they finish.
    pub(crate) fn close(&self) {
        self.slots.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[test]
    fn test_new_without_runtime_fails() {
        let err = WorkerPool::new(4).err().unwrap();
        assert!(err.contains("no tokio runtime"));
    }

    #[tokio::test]
    async fn test_rejects_beyond_capacity() {
        let pool = WorkerPool::new(1).unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        assert!(pool
            .try_spawn(async move {
                let _ = rx.await;
            })
            .is_ok());
        assert!(matches!(pool.try_spawn(async {}), Err(SpawnError::Full)));
        tx.send(()).unwrap();
    }

    #[tokio::test]
    async fn test_closed_pool_rejects() {
        let pool = WorkerPool::new(2).unwrap();
        pool.close();
        assert!(matches!(pool.try_spawn(async {}), Err(SpawnError::Closed)));
    }
}

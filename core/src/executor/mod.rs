//! Deferred, fire-and-forget task execution with non-blocking result harvesting.
//!
//! # Architecture
//!
//! ```text
//! submit(task_id, delay, fn)
//!   ↓  pending += 1
//! WorkerPool (lazy, semaphore-gated tokio tasks)
//!   ↓  sleep(jitter(delay)) → fn().await
//! TaskResult<T> → result buffer
//!   ↓  pending -= 1
//! take_results()  (drain-and-swap, each result delivered once)
//! ```
//!
//! One executor exists per result type, handed out by [`ExecutorRegistry`].

mod async_task;
mod pool;
mod registry;
mod result;

pub use async_task::{AsyncTaskExecutor, ExecutorOptions, DEFAULT_POOL_SIZE};
pub use registry::{ExecutorHandle, ExecutorRegistry};
pub use result::{Outcome, TaskResult};

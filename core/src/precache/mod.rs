//! Image pre-cache pipeline: catalog walk, bounded concurrent warm-up and
//! round-based retry.
//!
//! ```text
//! ImageCatalog (paged repos → paged versions → image refs)
//!   ↓  ImageFilter
//! semaphore slot → WarmStrategy::warm → ProgressSink
//!   ↓  failure
//! retry queue → next round (until empty or max_retries)
//! ```

mod catalog;
mod processor;
mod strategy;

pub use catalog::{ImageCatalog, ImageFilter, PageCursor, Paginated, DEFAULT_PAGE_SIZE};
pub use processor::{
    PrecacheOptions, PrecacheReport, Precacher, DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES,
};
pub use strategy::{
    PrecacheTaskStrategy, ProbeToolStrategy, WarmStrategy, WarmTiming, DEFAULT_POLL_INTERVAL,
    DEFAULT_TASK_TIMEOUT,
};

pub mod api;
pub mod chain;
pub mod cloud;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod jitter;
pub mod precache;
pub mod progress;
pub mod token;
pub mod util;

use thiserror::Error;

use super::cloud::CloudError;
use super::error::ConfigError;

/// Outcome of warming one image. Every variant makes the image retry-eligible.
#[derive(Error, Debug)]
pub enum WarmError {
    #[error("create failed: {0}")]
    Create(CloudError),

    #[error("warm-up failed: {0}")]
    Failed(String),

    #[error("status query failed: {0}")]
    Status(CloudError),

    #[error("timed out after {0}s waiting for readiness")]
    Timeout(u64),

    #[error("cancelled by shutdown")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum PrecacheError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("catalog listing failed: {0}")]
    Catalog(CloudError),
}

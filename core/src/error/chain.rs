use thiserror::Error;

use super::executor::ExecutorError;

/// Failures detected while setting up a stress chain. Nothing has been
/// submitted when one of these is returned.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("invalid stress round {index}: {source}")]
    InvalidRound {
        index: usize,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Submit(#[from] ExecutorError),
}

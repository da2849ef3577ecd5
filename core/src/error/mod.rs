#[allow(clippy::module_inception)]
pub mod error;
pub mod chain;
pub mod cloud;
pub mod executor;
pub mod precache;

pub use chain::ChainError;
pub use cloud::{CloudError, CloudErrorKind, TokenError};
pub use error::{CliError, ConfigError};
pub use executor::ExecutorError;
pub use precache::{PrecacheError, WarmError};

use thiserror::Error;

use super::precache::PrecacheError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("precache failed: {0}")]
    Precache(#[from] PrecacheError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl CliError {
    /// Process exit code.
    ///
    /// 11: configuration, 20: remote/runtime failure, 50: internal.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 11,
            Self::Precache(PrecacheError::Config(_)) => 11,
            Self::Precache(_) => 20,
            Self::Io(_) => 20,
            Self::Anyhow(_) => 50,
        }
    }
}

/// Problems detected before any remote work starts. Always fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting '{0}'")]
    Missing(&'static str),
    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("invalid image filter pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("cannot determine home directory")]
    NoHome,
}

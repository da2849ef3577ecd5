use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::AppConfig;

pub const ENV_SECRET_ID: &str = "TENCENTCLOUD_SECRET_ID";
pub const ENV_SECRET_KEY: &str = "TENCENTCLOUD_SECRET_KEY";
pub const ENV_REGION: &str = "TENCENTCLOUD_REGION";
pub const ENV_AGS_HOST: &str = "AGS_HOST";
pub const ENV_DATA_PLANE_DOMAIN_SUFFIX: &str = "AGS_DATA_PLANE_DOMAIN_SUFFIX";

/// Get the default data directory: ~/.ags
pub fn get_ags_data_dir() -> Result<PathBuf, ConfigError> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| ConfigError::NoHome)?;
    Ok(PathBuf::from(home).join(".ags"))
}

pub fn load_from_path(path: &Path) -> Result<AppConfig, ConfigError> {
    let display = path.display().to_string();
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: display.clone(),
        source,
    })?;
    toml::from_str::<AppConfig>(&s).map_err(|source| ConfigError::Parse {
        path: display,
        source,
    })
}

/// Loads the configuration and applies environment overrides.
///
/// Priority: `explicit` path (must exist) > ~/.ags/config.toml > ./config.toml
/// > built-in defaults. Environment variables override whatever file won.
pub fn load(explicit: Option<&str>) -> Result<AppConfig, ConfigError> {
    load_with_env(explicit, |key| std::env::var(key).ok())
}

pub fn load_with_env<F>(explicit: Option<&str>, env: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let data_dir = get_ags_data_dir()?;

    let mut cfg = match explicit.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) => {
            let expanded = shellexpand::tilde(p).into_owned();
            load_from_path(Path::new(&expanded))?
        }
        None => {
            let home_config = data_dir.join("config.toml");
            let local_config = Path::new("config.toml");
            if home_config.exists() {
                load_from_path(&home_config)?
            } else if local_config.exists() {
                load_from_path(local_config)?
            } else {
                AppConfig::default()
            }
        }
    };

    // Empty log directory means ~/.ags/logs.
    let directory_unset = cfg
        .logging
        .directory
        .as_deref()
        .map(|s| s.trim().is_empty())
        .unwrap_or(true);
    if directory_unset {
        cfg.logging.directory = Some(data_dir.join("logs").to_string_lossy().to_string());
    } else if let Some(dir) = cfg.logging.directory.as_mut() {
        *dir = shellexpand::tilde(dir.as_str()).into_owned();
    }

    apply_env_overrides(&mut cfg, env);
    Ok(cfg)
}

/// Environment variable overrides (highest priority after CLI flags).
pub fn apply_env_overrides<F>(cfg: &mut AppConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(v) = non_empty(ENV_SECRET_ID) {
        cfg.cloud.secret_id = v;
    }
    if let Some(v) = non_empty(ENV_SECRET_KEY) {
        cfg.cloud.secret_key = v;
    }
    if let Some(v) = non_empty(ENV_REGION) {
        cfg.cloud.region = v;
    }
    if let Some(v) = non_empty(ENV_AGS_HOST) {
        cfg.cloud.ags_endpoint = Some(v);
    }
    if let Some(v) = non_empty(ENV_DATA_PLANE_DOMAIN_SUFFIX) {
        cfg.cloud.data_plane_domain_suffix = v;
    }
}

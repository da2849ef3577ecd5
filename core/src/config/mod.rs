mod load;
mod types;

pub use load::{
    apply_env_overrides, get_ags_data_dir, load, load_from_path, load_with_env, ENV_AGS_HOST,
    ENV_DATA_PLANE_DOMAIN_SUFFIX, ENV_REGION, ENV_SECRET_ID, ENV_SECRET_KEY,
};
pub use types::{
    AgsMode, AppConfig, CloudConfig, ExecutorConfig, LoadTestConfig, LoggingConfig,
    PrecacheConfig, PrecacheMode,
};

use clap::{Args as ClapArgs, Parser, Subcommand};

use ags_core::api::{AppConfig, ConfigError, PrecacheMode};

#[derive(Parser, Debug)]
#[command(name = "ags", version, about = "Agent Sandbox image pre-cache and load-test driver")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.ags/config.toml, then ./config.toml).
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Keep console logging on even while progress bars are drawn.
    #[arg(long, global = true, default_value_t = false)]
    pub log_console: bool,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct PrecacheArgs {
    /// precache | sandboxtool
    #[arg(long)]
    pub mode: Option<String>,

    #[arg(long)]
    pub registry_id: Option<String>,

    #[arg(long)]
    pub namespace: Option<String>,

    /// Only image references matching this regex are warmed.
    #[arg(long)]
    pub image_regex: Option<String>,

    #[arg(long)]
    pub concurrency: Option<usize>,

    #[arg(long)]
    pub max_retries: Option<u32>,

    #[arg(long, default_value_t = false)]
    pub no_progress: bool,
}

impl PrecacheArgs {
    /// Command line flags win over file and environment values.
    pub fn apply(&self, cfg: &mut AppConfig) -> Result<(), ConfigError> {
        let p = &mut cfg.precache;
        if let Some(mode) = self.mode.as_deref() {
            p.mode = mode.parse::<PrecacheMode>()?;
        }
        if let Some(v) = &self.registry_id {
            p.registry_id = v.clone();
        }
        if let Some(v) = &self.namespace {
            p.namespace = v.clone();
        }
        if let Some(v) = &self.image_regex {
            p.image_regex = Some(v.clone());
        }
        if let Some(v) = self.concurrency {
            p.concurrency = v;
        }
        if let Some(v) = self.max_retries {
            p.max_retries = v;
        }
        Ok(())
    }
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct LoadTestArgs {
    #[arg(long)]
    pub iterations: Option<u64>,

    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Seconds between start and stop (or start of the stress chain).
    #[arg(long)]
    pub stop_after_secs: Option<u64>,

    /// Run the configured stress rounds on every instance.
    #[arg(long, default_value_t = false)]
    pub stress: bool,

    /// Start parameters as a JSON object, replacing `loadtest.instance_params`.
    #[arg(long)]
    pub params_json: Option<String>,
}

impl LoadTestArgs {
    pub fn apply(&self, cfg: &mut AppConfig) -> Result<(), ConfigError> {
        let l = &mut cfg.loadtest;
        if let Some(v) = self.iterations {
            l.iterations = v;
        }
        if let Some(v) = self.interval_ms {
            l.interval_ms = v;
        }
        if let Some(v) = self.stop_after_secs {
            l.stop_after_secs = v;
        }
        if self.stress {
            l.stress = true;
        }
        if let Some(raw) = &self.params_json {
            l.instance_params =
                serde_json::from_str(raw).map_err(|e| ConfigError::Invalid {
                    field: "--params-json",
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Warm every image of a registry namespace on the sandbox platform.
    Precache(PrecacheArgs),
    /// Start instances in a loop and stop them (optionally after stress rounds).
    Loadtest(LoadTestArgs),
}

use std::sync::Arc;

use ags_core::api::{CloudConfig, CloudError, ConfigError, TokenCache};

use crate::cloud::{AgsClient, CloudApiClient, Credential, TcrClient, AGS_SERVICE, TCR_SERVICE};
use crate::dataplane::ShellHttpClient;

fn credential(cfg: &CloudConfig) -> Credential {
    Credential {
        secret_id: cfg.secret_id.clone(),
        secret_key: cfg.secret_key.clone(),
    }
}

fn client_error(field: &'static str, err: CloudError) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: err.to_string(),
    }
}

pub fn build_ags(cfg: &CloudConfig) -> Result<AgsClient, ConfigError> {
    let api = CloudApiClient::new(
        AGS_SERVICE,
        cfg.ags_host(),
        cfg.region.clone(),
        credential(cfg),
        cfg.request_timeout(),
        cfg.ags_rate_limit,
    )
    .map_err(|e| client_error("cloud.ags_endpoint", e))?;
    Ok(AgsClient::new(api))
}

pub fn build_tcr(cfg: &CloudConfig) -> Result<TcrClient, ConfigError> {
    let api = CloudApiClient::new(
        TCR_SERVICE,
        cfg.tcr_endpoint.trim(),
        cfg.region.clone(),
        credential(cfg),
        cfg.request_timeout(),
        cfg.tcr_rate_limit,
    )
    .map_err(|e| client_error("cloud.tcr_endpoint", e))?;
    Ok(TcrClient::new(api))
}

pub fn build_shell(cfg: &CloudConfig, tokens: Arc<TokenCache>) -> Result<ShellHttpClient, ConfigError> {
    ShellHttpClient::new(
        tokens,
        cfg.region.clone(),
        cfg.data_plane_domain_suffix.clone(),
    )
    .map_err(|e| client_error("cloud.data_plane_domain_suffix", e))
}

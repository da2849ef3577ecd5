use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use ags_core::api::{
    CloudError, ShellExec, ShellExecRequest, ShellExecResponse, TokenCache, DEFAULT_SHELL_PORT,
};

use crate::cloud::client::{preview_body, transport_error};

/// Headroom on top of the command timeout for network and process startup.
const HTTP_TIMEOUT_HEADROOM_SECS: u64 = 30;
const MIN_HTTP_TIMEOUT_SECS: u64 = 60;

/// HTTP timeout for one exec call: `max(timeout + 30s, 60s)`.
pub fn http_timeout(command_timeout: Option<u64>) -> Duration {
    let secs = command_timeout.unwrap_or(0) + HTTP_TIMEOUT_HEADROOM_SECS;
    Duration::from_secs(secs.max(MIN_HTTP_TIMEOUT_SECS))
}

/// Client for the command-execution service running inside each sandbox.
///
/// Requests go to `https://{port}-{instance}.{region}.{suffix}/exec` and carry
/// the instance's access token in `X-Access-Token`.
pub struct ShellHttpClient {
    http: reqwest::Client,
    tokens: Arc<TokenCache>,
    region: String,
    domain_suffix: String,
    base_url: Option<String>,
}

impl ShellHttpClient {
    pub fn new(
        tokens: Arc<TokenCache>,
        region: impl Into<String>,
        domain_suffix: impl Into<String>,
    ) -> Result<Self, CloudError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| transport_error(err, "<shell client>"))?;
        Ok(Self {
            http,
            tokens,
            region: region.into(),
            domain_suffix: domain_suffix.into(),
            base_url: None,
        })
    }

    /// Sends every request to `{base_url}/exec` regardless of instance and port.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.trim_end_matches('/').to_string());
        self
    }

    pub fn exec_url(&self, instance_id: &str, port: u16) -> String {
        match &self.base_url {
            Some(base) => format!("{}/exec", base),
            None => format!(
                "https://{}-{}.{}.{}/exec",
                port, instance_id, self.region, self.domain_suffix
            ),
        }
    }

    async fn send(
        &self,
        instance_id: &str,
        port: u16,
        request: &ShellExecRequest,
    ) -> Result<ShellExecResponse, String> {
        let token = self
            .tokens
            .get_token(instance_id)
            .await
            .map_err(|e| e.to_string())?;

        let url = self.exec_url(instance_id, port);
        tracing::debug!(
            target: "ags.shell",
            stage = "shell.exec.in",
            instance_id = %instance_id,
            url = %url,
            timeout = ?request.timeout
        );
        let resp = self
            .http
            .post(&url)
            .header("X-Access-Token", token)
            .timeout(http_timeout(request.timeout))
            .json(request)
            .send()
            .await
            .map_err(|err| transport_error(err, &url).to_string())?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|err| transport_error(err, &url).to_string())?;
        tracing::debug!(
            target: "ags.shell",
            stage = "shell.exec.out",
            instance_id = %instance_id,
            status = %status
        );

        if status != reqwest::StatusCode::OK {
            return Err(format!(
                "unexpected status code: {}, body: {}",
                status.as_u16(),
                preview_body(&body)
            ));
        }
        serde_json::from_str::<ShellExecResponse>(&body).map_err(|err| {
            format!(
                "failed to parse response: {}, body: {}",
                err,
                preview_body(&body)
            )
        })
    }
}

#[async_trait]
impl ShellExec for ShellHttpClient {
    async fn exec(
        &self,
        instance_id: &str,
        port: u16,
        request: ShellExecRequest,
    ) -> ShellExecResponse {
        let started = Instant::now();
        let port = if port == 0 { DEFAULT_SHELL_PORT } else { port };
        let result = self.send(instance_id, port, &request).await;
        let timing_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(mut resp) => {
                resp.timing_ms = timing_ms;
                resp
            }
            Err(error) => ShellExecResponse::failed(error, timing_ms),
        }
    }
}

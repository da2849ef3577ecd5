use std::time::Duration;

use ags_core::api::{CloudError, CloudErrorKind, RateLimiter};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::signer::{self, Credential, SignInput};

const BODY_PREVIEW_LIMIT: usize = 512;

/// API product name and version, as sent in the signing scope and `X-TC-Version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiService {
    pub name: &'static str,
    pub version: &'static str,
}

pub const AGS_SERVICE: ApiService = ApiService {
    name: "ags",
    version: "2025-09-20",
};

pub const TCR_SERVICE: ApiService = ApiService {
    name: "tcr",
    version: "2019-09-24",
};

pub(crate) fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    let mut out: String = trimmed.chars().take(BODY_PREVIEW_LIMIT).collect();
    if trimmed.chars().count() > BODY_PREVIEW_LIMIT {
        out.push_str("...");
    }
    out
}

pub(crate) fn transport_error(err: reqwest::Error, url: &str) -> CloudError {
    let kind = if err.is_timeout() {
        CloudErrorKind::Timeout
    } else if err.is_connect() {
        CloudErrorKind::Connect
    } else if err.is_request() {
        CloudErrorKind::Request
    } else if err.is_body() {
        CloudErrorKind::Body
    } else if err.is_decode() {
        CloudErrorKind::Decode
    } else {
        CloudErrorKind::Unknown
    };
    CloudError::new(kind, format!("{} url={}", err, url))
}

fn status_error(status: u16, url: &str, preview: String) -> CloudError {
    CloudError::new(
        CloudErrorKind::Status,
        format!("status={} url={}: {}", status, url, preview),
    )
}

fn decode_error(action: &str, err: serde_json::Error, preview: String) -> CloudError {
    CloudError::new(
        CloudErrorKind::Decode,
        format!("failed to decode {} response: {} | body={}", action, err, preview),
    )
}

/// Unwraps the `Response` envelope, turning `Response.Error` into an API error.
fn unwrap_envelope(action: &str, mut body: Value) -> Result<Value, CloudError> {
    let Some(response) = body.get_mut("Response").map(Value::take) else {
        return Err(CloudError::empty(&format!("{action} envelope")));
    };

    if let Some(error) = response.get("Error").filter(|e| !e.is_null()) {
        let field = |key: &str| {
            error
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let request_id = response
            .get("RequestId")
            .and_then(Value::as_str)
            .map(str::to_string);
        return Err(CloudError::api(field("Code"), field("Message"), request_id));
    }

    Ok(response)
}

/// Signed JSON-over-POST client for one cloud API product.
///
/// Every call waits on the client's rate limiter first, so all users of one
/// client share its request budget.
pub struct CloudApiClient {
    http: reqwest::Client,
    service: ApiService,
    host: String,
    url: String,
    region: String,
    credential: Credential,
    limiter: RateLimiter,
}

impl CloudApiClient {
    pub fn new(
        service: ApiService,
        host: impl Into<String>,
        region: impl Into<String>,
        credential: Credential,
        timeout: Duration,
        requests_per_second: u32,
    ) -> Result<Self, CloudError> {
        let host = host.into();
        let url = format!("https://{}/", host);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| transport_error(err, &url))?;
        Ok(Self {
            http,
            service,
            host,
            url,
            region: region.into(),
            credential,
            limiter: RateLimiter::per_second(requests_per_second),
        })
    }

    /// Sends requests to `base_url` while still signing for the configured host.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.url = format!("{}/", base_url.trim_end_matches('/'));
        self
    }

    pub fn service(&self) -> ApiService {
        self.service
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Calls `action` and returns the unwrapped `Response` object.
    pub async fn call(&self, action: &str, params: &Value) -> Result<Value, CloudError> {
        self.limiter.acquire().await;

        let payload = serde_json::to_string(params).map_err(|err| {
            CloudError::new(
                CloudErrorKind::Request,
                format!("cannot encode {} parameters: {}", action, err),
            )
        })?;
        let timestamp = chrono::Utc::now().timestamp();
        let authorization = signer::authorization(
            &self.credential,
            &SignInput {
                service: self.service.name,
                host: &self.host,
                action,
                payload: &payload,
                timestamp,
            },
        );

        tracing::debug!(
            target: "ags.cloud",
            stage = "cloud.call.in",
            service = self.service.name,
            action = action,
            url = %self.url
        );
        let resp = self
            .http
            .post(&self.url)
            .header("Authorization", authorization)
            .header("Content-Type", signer::CONTENT_TYPE)
            .header("X-TC-Action", action)
            .header("X-TC-Version", self.service.version)
            .header("X-TC-Timestamp", timestamp.to_string())
            .header("X-TC-Region", &self.region)
            .body(payload)
            .send()
            .await
            .map_err(|err| transport_error(err, &self.url))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|err| transport_error(err, &self.url))?;
        if !status.is_success() {
            return Err(status_error(status.as_u16(), &self.url, preview_body(&body)));
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|err| decode_error(action, err, preview_body(&body)))?;
        let response = unwrap_envelope(action, value);
        tracing::debug!(
            target: "ags.cloud",
            stage = "cloud.call.out",
            service = self.service.name,
            action = action,
            status = %status,
            ok = response.is_ok()
        );
        response
    }

    /// Like [`call`](Self::call), deserializing the `Response` object into `T`.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        action: &str,
        params: &Value,
    ) -> Result<T, CloudError> {
        let response = self.call(action, params).await?;
        let preview = preview_body(&response.to_string());
        serde_json::from_value(response).map_err(|err| decode_error(action, err, preview))
    }
}

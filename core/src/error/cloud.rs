use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudErrorKind {
    Timeout,
    Connect,
    Request,
    Body,
    Decode,
    Status,
    Api,
    Empty,
    NotFound,
    Unknown,
}

impl CloudErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Request => "request",
            Self::Body => "body",
            Self::Decode => "decode",
            Self::Status => "status",
            Self::Api => "api",
            Self::Empty => "empty",
            Self::NotFound => "not_found",
            Self::Unknown => "unknown",
        }
    }

    /// Rate limits, timeouts and connection drops are worth another attempt.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connect | Self::Request | Self::Body | Self::Status
        )
    }
}

impl fmt::Display for CloudErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single remote call (control plane, registry or data plane).
#[derive(Error, Debug, Clone)]
pub struct CloudError {
    pub kind: CloudErrorKind,
    pub code: Option<String>,
    pub request_id: Option<String>,
    pub message: String,
}

impl CloudError {
    pub fn new(kind: CloudErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            request_id: None,
            message: message.into(),
        }
    }

    pub fn api(code: impl Into<String>, message: impl Into<String>, request_id: Option<String>) -> Self {
        Self {
            kind: CloudErrorKind::Api,
            code: Some(code.into()),
            request_id,
            message: message.into(),
        }
    }

    pub fn empty(what: &str) -> Self {
        Self::new(CloudErrorKind::Empty, format!("empty {what} in response"))
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(CloudErrorKind::NotFound, what)
    }

    pub fn is_transient(&self) -> bool {
        if self.kind == CloudErrorKind::Api {
            return self
                .code
                .as_deref()
                .map(|c| c.starts_with("RequestLimitExceeded") || c.starts_with("InternalError"))
                .unwrap_or(false);
        }
        self.kind.is_transient()
    }
}

impl fmt::Display for CloudError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cloud error kind={}", self.kind)?;
        if let Some(code) = &self.code {
            write!(f, " code={}", code)?;
        }
        if let Some(request_id) = &self.request_id {
            write!(f, " request_id={}", request_id)?;
        }
        write!(f, ": {}", self.message)
    }
}

#[derive(Error, Debug, Clone)]
pub enum TokenError {
    #[error("token acquisition failed for '{resource}': {reason}")]
    Acquisition { resource: String, reason: String },
}

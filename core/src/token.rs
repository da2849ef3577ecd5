//! Per-instance access token cache with refresh-ahead.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::cloud::TokenSource;
use crate::error::TokenError;

/// Entries are treated as stale this long before their real expiry.
pub const REFRESH_MARGIN_SECS: i64 = 30;
/// Lifetime assumed when the service omits (or garbles) the expiry.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 300;

#[derive(Debug)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

/// Shared, read-mostly token cache consulted before every data-plane call.
///
/// Readers take the shared lock only; a miss takes the exclusive lock, checks
/// again and performs at most one remote acquisition while holding it, so a
/// burst of callers on a cold entry results in a single remote call.
pub struct TokenCache {
    source: Arc<dyn TokenSource>,
    entries: RwLock<HashMap<String, Arc<CachedToken>>>,
}

impl TokenCache {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_token(&self, resource_id: &str) -> Result<String, TokenError> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(resource_id) {
                if entry.is_fresh(Utc::now()) {
                    return Ok(entry.token.clone());
                }
            }
        }

        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(resource_id) {
            if entry.is_fresh(Utc::now()) {
                return Ok(entry.token.clone());
            }
        }

        tracing::debug!(resource = %resource_id, "acquiring access token");
        let issued = self
            .source
            .acquire_token(resource_id)
            .await
            .map_err(|e| TokenError::Acquisition {
                resource: resource_id.to_string(),
                reason: e.to_string(),
            })?;

        if issued.token.is_empty() {
            return Err(TokenError::Acquisition {
                resource: resource_id.to_string(),
                reason: "empty token response".to_string(),
            });
        }

        let expires_at = parse_expiry(issued.expires_at.as_deref(), Utc::now());
        let token = issued.token;
        entries.insert(
            resource_id.to_string(),
            Arc::new(CachedToken {
                token: token.clone(),
                expires_at,
            }),
        );
        Ok(token)
    }
}

fn parse_expiry(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| now + Duration::seconds(DEFAULT_TOKEN_TTL_SECS))
}

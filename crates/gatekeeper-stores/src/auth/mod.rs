//! Access tokens for store APIs
//!
//! - [`TokenSource`]: anything that can hand out a bearer token
//! - [`google::GoogleTokenProvider`]: Google OAuth tokens from a service
//!   account key or a workload identity federation config
//! - [`validate_token`]: offline sanity check for a token string

pub mod google;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use gatekeeper_core::Result;
use serde::Serialize;
use serde_json::Value;

pub use google::GoogleTokenProvider;

/// Source of bearer tokens
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// A fixed token, for pre-issued credentials
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait::async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Cached bearer token, considered stale five minutes before expiry
#[derive(Debug, Default)]
pub(crate) struct TokenCache {
    access_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl TokenCache {
    pub(crate) fn get(&self) -> Option<String> {
        match (&self.access_token, self.expires_at) {
            (Some(token), Some(expires)) if Utc::now() < expires - Duration::minutes(5) => {
                Some(token.clone())
            }
            _ => None,
        }
    }

    pub(crate) fn store(&mut self, token: &str, expires_at: DateTime<Utc>) {
        self.access_token = Some(token.to_string());
        self.expires_at = Some(expires_at);
    }
}

/// Outcome of [`validate_token`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenValidation {
    fn valid(expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            valid: true,
            reason: None,
            expires_at,
        }
    }

    fn invalid(reason: &str, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.to_string()),
            expires_at,
        }
    }
}

/// Check a token without contacting its issuer
///
/// JWTs are decoded and their `exp` claim compared with the current time.
/// Opaque tokens must be at least 20 characters of `[A-Za-z0-9._-]`.
pub fn validate_token(token: &str) -> TokenValidation {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return TokenValidation::invalid("Token must not be empty.", None);
    }

    let parts: Vec<&str> = trimmed.split('.').collect();
    if parts.len() == 3 {
        return validate_jwt(parts[1]);
    }

    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-');
    if !trimmed.chars().all(allowed) {
        return TokenValidation::invalid("Token contains invalid characters.", None);
    }

    if trimmed.len() < 20 {
        return TokenValidation::invalid("Token is too short to be valid.", None);
    }

    TokenValidation::valid(None)
}

fn validate_jwt(payload_segment: &str) -> TokenValidation {
    let payload = URL_SAFE_NO_PAD
        .decode(payload_segment.trim_end_matches('='))
        .ok()
        .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok());

    let Some(payload) = payload else {
        return TokenValidation::invalid("Token payload could not be decoded.", None);
    };

    let Some(exp) = payload.get("exp").and_then(Value::as_f64) else {
        return TokenValidation::valid(None);
    };

    let Some(expires_at) = DateTime::from_timestamp_millis((exp * 1000.0) as i64) else {
        return TokenValidation::invalid("Token expiration claim is invalid.", None);
    };

    if Utc::now() >= expires_at {
        TokenValidation::invalid("Token has expired.", Some(expires_at))
    } else {
        TokenValidation::valid(Some(expires_at))
    }
}

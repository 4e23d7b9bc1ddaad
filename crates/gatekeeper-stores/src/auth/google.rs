//! Google OAuth access tokens
//!
//! Supports two credential shapes, selected by the `type` field:
//!
//! - `service_account`: a JSON key; a signed RS256 assertion is exchanged at
//!   the key's `token_uri`
//! - `external_account`: workload identity federation; a subject token read
//!   from a file or URL is exchanged at Google STS, then optionally traded
//!   for a service account token via impersonation

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use gatekeeper_core::{PublishError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use super::{TokenCache, TokenSource};

/// OAuth scope for the Chrome Web Store API
pub const CHROME_WEBSTORE_SCOPE: &str = "https://www.googleapis.com/auth/chromewebstore";

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_STS_URL: &str = "https://sts.googleapis.com/v1/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum GoogleCredentials {
    ServiceAccount(ServiceAccountKey),
    ExternalAccount(ExternalAccount),
}

#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ExternalAccount {
    audience: String,
    subject_token_type: String,
    token_url: Option<String>,
    service_account_impersonation_url: Option<String>,
    credential_source: CredentialSource,
}

#[derive(Debug, Clone, Deserialize)]
struct CredentialSource {
    file: Option<PathBuf>,
    url: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    format: Option<SourceFormat>,
}

#[derive(Debug, Clone, Deserialize)]
struct SourceFormat {
    #[serde(rename = "type")]
    kind: Option<String>,
    subject_token_field_name: Option<String>,
}

/// OAuth token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImpersonationResponse {
    access_token: String,
    expire_time: DateTime<Utc>,
}

/// Issues and caches Google access tokens
pub struct GoogleTokenProvider {
    credentials: GoogleCredentials,
    scopes: Vec<String>,
    client: Client,
    token_cache: Arc<RwLock<TokenCache>>,
}

impl GoogleTokenProvider {
    /// Build a provider from a Google credential configuration object
    pub fn from_config(config: &Value, scopes: &[&str]) -> Result<Self> {
        if !config.as_object().is_some_and(|o| !o.is_empty()) {
            return Err(PublishError::authentication(
                "Workload Identity Federation configuration is required",
            ));
        }

        let credentials: GoogleCredentials =
            serde_json::from_value(config.clone()).map_err(|e| {
                PublishError::authentication(format!(
                    "Unsupported Google credential configuration: {}",
                    e
                ))
            })?;

        let scopes = if scopes.is_empty() {
            vec![CHROME_WEBSTORE_SCOPE.to_string()]
        } else {
            scopes.iter().map(|s| s.to_string()).collect()
        };

        Ok(Self {
            credentials,
            scopes,
            client: Client::new(),
            token_cache: Arc::new(RwLock::new(TokenCache::default())),
        })
    }

    async fn fetch_token(&self) -> Result<(String, DateTime<Utc>)> {
        match &self.credentials {
            GoogleCredentials::ServiceAccount(key) => self.service_account_token(key).await,
            GoogleCredentials::ExternalAccount(account) => self.external_account_token(account).await,
        }
    }

    async fn service_account_token(&self, key: &ServiceAccountKey) -> Result<(String, DateTime<Utc>)> {
        let token_uri = key.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
        let now = Utc::now();

        #[derive(Serialize)]
        struct Claims<'a> {
            iss: &'a str,
            scope: String,
            aud: &'a str,
            iat: i64,
            exp: i64,
        }

        let claims = Claims {
            iss: &key.client_email,
            scope: self.scopes.join(" "),
            aud: token_uri,
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        };

        let encoding_key = jsonwebtoken::EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| auth_error(format!("Invalid private key: {}", e)))?;

        let assertion = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256),
            &claims,
            &encoding_key,
        )
        .map_err(|e| auth_error(format!("Failed to sign token request: {}", e)))?;

        debug!(token_uri, "exchanging service account assertion");
        let response = self
            .client
            .post(token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| auth_error(format!("Token request failed: {}", e)))?;

        let token: TokenResponse = parse_token_response(response).await?;
        Ok((token.access_token, expiry(token.expires_in)))
    }

    async fn external_account_token(&self, account: &ExternalAccount) -> Result<(String, DateTime<Utc>)> {
        let subject_token = self.subject_token(&account.credential_source).await?;
        let token_url = account.token_url.as_deref().unwrap_or(DEFAULT_STS_URL);

        let sts_scope = if account.service_account_impersonation_url.is_some() {
            CLOUD_PLATFORM_SCOPE.to_string()
        } else {
            self.scopes.join(" ")
        };

        debug!(token_url, "exchanging subject token at STS");
        let response = self
            .client
            .post(token_url)
            .form(&[
                ("grant_type", TOKEN_EXCHANGE_GRANT),
                ("audience", account.audience.as_str()),
                ("scope", sts_scope.as_str()),
                ("requested_token_type", ACCESS_TOKEN_TYPE),
                ("subject_token_type", account.subject_token_type.as_str()),
                ("subject_token", subject_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| auth_error(format!("STS token exchange failed: {}", e)))?;

        let sts: TokenResponse = parse_token_response(response).await?;

        let Some(impersonation_url) = &account.service_account_impersonation_url else {
            return Ok((sts.access_token, expiry(sts.expires_in)));
        };

        debug!("impersonating service account");
        let response = self
            .client
            .post(impersonation_url)
            .bearer_auth(&sts.access_token)
            .json(&json!({ "scope": self.scopes, "lifetime": "3600s" }))
            .send()
            .await
            .map_err(|e| auth_error(format!("Service account impersonation failed: {}", e)))?;

        let impersonated: ImpersonationResponse = parse_token_response(response).await?;
        Ok((impersonated.access_token, impersonated.expire_time))
    }

    async fn subject_token(&self, source: &CredentialSource) -> Result<String> {
        let raw = if let Some(file) = &source.file {
            tokio::fs::read_to_string(file).await.map_err(|e| {
                auth_error(format!(
                    "Unable to read subject token from {}: {}",
                    file.display(),
                    e
                ))
            })?
        } else if let Some(url) = &source.url {
            let mut request = self.client.get(url);
            for (name, value) in &source.headers {
                request = request.header(name, value);
            }
            let response = request
                .send()
                .await
                .map_err(|e| auth_error(format!("Unable to fetch subject token: {}", e)))?;
            if !response.status().is_success() {
                return Err(auth_error(format!(
                    "Subject token endpoint returned {}",
                    response.status()
                )));
            }
            response
                .text()
                .await
                .map_err(|e| auth_error(format!("Unable to read subject token: {}", e)))?
        } else {
            return Err(auth_error("credential_source must specify a file or url"));
        };

        extract_subject_token(&raw, source.format.as_ref())
    }
}

#[async_trait::async_trait]
impl TokenSource for GoogleTokenProvider {
    #[instrument(skip(self), fields(scopes = ?self.scopes))]
    async fn access_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(token) = cache.get() {
                return Ok(token);
            }
        }

        let (token, expires_at) = self.fetch_token().await?;
        if token.is_empty() {
            return Err(auth_error("Google access token response was empty"));
        }

        {
            let mut cache = self.token_cache.write().await;
            cache.store(&token, expires_at);
        }

        info!(expires_at = %expires_at, "obtained Google access token");
        Ok(token)
    }
}

fn extract_subject_token(raw: &str, format: Option<&SourceFormat>) -> Result<String> {
    let is_json = format.and_then(|f| f.kind.as_deref()) == Some("json");
    let token = if is_json {
        let field = format
            .and_then(|f| f.subject_token_field_name.as_deref())
            .ok_or_else(|| auth_error("subject_token_field_name is required for json sources"))?;
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| auth_error(format!("Subject token is not valid JSON: {}", e)))?;
        value
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| auth_error(format!("Subject token field {} missing", field)))?
    } else {
        raw.trim().to_string()
    };

    if token.is_empty() {
        return Err(auth_error("Subject token is empty"));
    }
    Ok(token)
}

async fn parse_token_response<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(auth_error(format!("Token endpoint returned {}", status))
            .with_status(status.as_u16())
            .with_context("body", body));
    }

    response
        .json()
        .await
        .map_err(|e| auth_error(format!("Unexpected token response: {}", e)))
}

fn expiry(expires_in: Option<i64>) -> DateTime<Utc> {
    Utc::now() + Duration::seconds(expires_in.unwrap_or(3600))
}

fn auth_error(message: impl Into<String>) -> PublishError {
    PublishError::authentication(message)
}

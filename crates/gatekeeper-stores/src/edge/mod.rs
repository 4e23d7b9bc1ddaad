//! Microsoft Edge Add-ons integration
//!
//! Uses the Edge Add-ons API v1 with Azure AD client-credentials tokens.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, Utc};
use gatekeeper_core::config::EdgeCredentials;
use gatekeeper_core::{PublishError, Result, StoreKind};
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::auth::TokenCache;
use crate::http::{self, ApiMessages};
use crate::manifest;
use crate::packaging;
use crate::traits::StoreClient;
use crate::types::*;

const API_BASE_URL: &str = "https://api.addons.microsoftedge.microsoft.com/v1";
const LOGIN_URL: &str = "https://login.microsoftonline.com";
const TOKEN_SCOPE: &str = "https://api.addons.microsoftedge.microsoft.com/.default";
const DEFAULT_TENANT: &str = "organizations";

const MESSAGES: ApiMessages = ApiMessages {
    authentication: "Edge authentication failed",
    quota: "Edge API quota exceeded",
    api: "Edge API request failed",
    network: "Edge network request failed",
};

const TOKEN_MESSAGES: ApiMessages = ApiMessages {
    network: "Edge token request failed",
    ..MESSAGES
};

/// Microsoft Edge Add-ons API client
pub struct EdgeStore {
    credentials: EdgeCredentials,
    client: Client,
    token_cache: Arc<RwLock<TokenCache>>,
    api_base: String,
    login_base: String,
}

impl EdgeStore {
    pub fn new(credentials: EdgeCredentials) -> Result<Self> {
        ensure_credentials(&credentials)?;
        Ok(Self {
            credentials,
            client: Client::new(),
            token_cache: Arc::new(RwLock::new(TokenCache::default())),
            api_base: API_BASE_URL.to_string(),
            login_base: LOGIN_URL.to_string(),
        })
    }

    /// Point the client at different API and login roots
    pub fn with_endpoints(mut self, api_base: impl Into<String>, login_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self.login_base = login_base.into().trim_end_matches('/').to_string();
        self
    }

    fn tenant(&self) -> &str {
        self.credentials
            .tenant_id
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TENANT)
    }

    fn product_url(&self, suffix: &str) -> String {
        format!("{}/products/{}/{}", self.api_base, self.credentials.product_id, suffix)
    }

    /// Get or refresh the OAuth2 access token
    async fn get_access_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(token) = cache.get() {
                return Ok(token);
            }
        }

        let token_url = format!("{}/{}/oauth2/v2.0/token", self.login_base, self.tenant());
        debug!(tenant = self.tenant(), "requesting Edge access token");

        let request = self.client.post(&token_url).form(&[
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("grant_type", "client_credentials"),
            ("scope", TOKEN_SCOPE),
        ]);

        let response = http::send(request, &TOKEN_MESSAGES).await?;
        let payload = http::read_payload(response, &TOKEN_MESSAGES).await?;

        let token = http::string_field(payload.as_ref(), &["access_token"]).ok_or_else(|| {
            PublishError::authentication("Edge access token response was empty")
                .with_context("body", payload.clone().unwrap_or_default())
        })?;
        let expires_in = payload
            .as_ref()
            .and_then(|p| p.get("expires_in"))
            .and_then(Value::as_i64)
            .unwrap_or(3600);

        {
            let mut cache = self.token_cache.write().await;
            cache.store(&token, Utc::now() + Duration::seconds(expires_in));
        }

        Ok(token)
    }

    /// Make an authenticated API request
    async fn api_request(&self, method: Method, url: &str, body: Option<RequestBody>) -> Result<Option<Value>> {
        let token = self.get_access_token().await?;

        let mut request = self
            .client
            .request(method.clone(), url)
            .bearer_auth(token)
            .header("Accept", "application/json");

        request = match body {
            Some(RequestBody::Json(value)) => request.json(&value),
            Some(RequestBody::Zip(bytes)) => request.header("Content-Type", "application/zip").body(bytes),
            None => request,
        };

        debug!("Making {} request to {}", method, url);
        let response = http::send(request, &MESSAGES).await?;
        http::read_payload(response, &MESSAGES).await
    }
}

enum RequestBody {
    Json(Value),
    Zip(Vec<u8>),
}

fn ensure_credentials(credentials: &EdgeCredentials) -> Result<()> {
    if credentials.client_id.trim().is_empty()
        || credentials.client_secret.trim().is_empty()
        || credentials.product_id.trim().is_empty()
    {
        return Err(PublishError::authentication("Edge credentials are incomplete"));
    }
    Ok(())
}

#[async_trait::async_trait]
impl StoreClient for EdgeStore {
    fn name(&self) -> &str {
        "Microsoft Edge Add-ons"
    }

    fn store(&self) -> StoreKind {
        StoreKind::Edge
    }

    fn is_available(&self) -> bool {
        ensure_credentials(&self.credentials).is_ok()
    }

    #[instrument(skip(self, manifest, options), fields(store = "edge"))]
    async fn validate(&self, manifest: &Value, options: &ValidateOptions) -> Result<()> {
        let fields = manifest::as_object(manifest)?;
        manifest::require_fields(fields, &["name", "version", "manifest_version", "icons"])?;

        let version = manifest::manifest_version(fields)?;
        if version != 2.0 && version != 3.0 {
            return Err(PublishError::validation(
                "Edge supports manifest_version 2 or 3 only",
            ));
        }

        manifest::require_icons(fields, "Manifest must specify at least one icon for Edge")?;

        if let Some(source_dir) = &options.source_dir {
            if !source_dir.exists() {
                return Err(PublishError::validation(
                    "Manifest directory not found for validation",
                ));
            }
        }

        Ok(())
    }

    #[instrument(skip(self), fields(store = "edge"))]
    async fn package(&self, source_dir: &Path, output: Option<&Path>) -> Result<PathBuf> {
        if !source_dir.exists() {
            return Err(PublishError::validation(
                "Manifest directory not found for packaging",
            ));
        }

        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| packaging::default_output(source_dir, "zip"));
        packaging::package_directory(source_dir, &output).await
    }

    #[instrument(skip(self), fields(store = "edge", product = %self.credentials.product_id))]
    async fn upload(&self, artifact: &Path) -> Result<String> {
        let bytes = tokio::fs::read(artifact).await.map_err(|_| {
            PublishError::validation(format!("Artifact not found at path: {}", artifact.display()))
        })?;

        info!(size = bytes.len(), "uploading package to Edge Add-ons");
        let payload = self
            .api_request(
                Method::POST,
                &self.product_url("submissions/draft/package"),
                Some(RequestBody::Zip(bytes)),
            )
            .await?;

        http::string_field(payload.as_ref(), &["submissionId", "id"]).ok_or_else(|| {
            PublishError::api("Edge upload response missing submission identifier")
                .with_context("body", payload.unwrap_or_default())
        })
    }

    #[instrument(skip(self, options), fields(store = "edge"))]
    async fn publish(&self, upload_id: &str, options: &PublishOptions) -> Result<PublishResult> {
        if upload_id.trim().is_empty() {
            return Err(PublishError::validation("uploadId is required for Edge publish"));
        }

        let mut body = json!({ "submissionId": upload_id });
        if let Some(notes) = &options.notes {
            body["notes"] = json!(notes);
        }

        let payload = self
            .api_request(Method::POST, &self.product_url("submissions"), Some(RequestBody::Json(body)))
            .await?;

        let submission_id =
            http::string_field(payload.as_ref(), &["id"]).unwrap_or_else(|| upload_id.to_string());
        let status =
            http::string_field(payload.as_ref(), &["status"]).unwrap_or_else(|| "submitted".to_string());

        info!(submission_id = %submission_id, status = %status, "submission published");
        Ok(PublishResult {
            success: true,
            url: None,
            submission_id: Some(submission_id),
            status: Some(status),
        })
    }

    #[instrument(skip(self), fields(store = "edge"))]
    async fn cancel(&self, upload_id: Option<&str>) -> Result<CancelResult> {
        let segment = match upload_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => format!("submissions/{}", id),
            None => "submissions/draft".to_string(),
        };

        self.api_request(Method::DELETE, &self.product_url(&segment), None)
            .await?;
        Ok(CancelResult { cancelled: true })
    }
}

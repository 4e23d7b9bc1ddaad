//! Chrome Web Store integration
//!
//! Uploads and publishes items through the Chrome Web Store API v1.1.
//!
//! ## Authentication
//!
//! Uses a Google credential configuration (`wifConfig`): either a service
//! account key or a workload identity federation config.
//!
//! ## Usage
//!
//! ```ignore
//! use gatekeeper_stores::chrome::ChromeStore;
//!
//! let store = ChromeStore::new(credentials)?;
//! let upload_id = store.upload(&artifact).await?;
//! store.publish(&upload_id, &options).await?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use gatekeeper_core::config::ChromeCredentials;
use gatekeeper_core::{PublishError, Result, StoreKind};
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use crate::auth::google::CHROME_WEBSTORE_SCOPE;
use crate::auth::{GoogleTokenProvider, TokenSource};
use crate::http::{self, ApiMessages};
use crate::manifest;
use crate::packaging;
use crate::traits::StoreClient;
use crate::types::*;
use crate::webext::WebExt;

const API_BASE_URL: &str = "https://www.googleapis.com/chromewebstore/v1.1";
const API_VERSION_HEADER: &str = "2";
const ALLOWED_TARGETS: [&str; 2] = ["default", "trustedTesters"];

const MESSAGES: ApiMessages = ApiMessages {
    authentication: "Chrome Web Store authentication failed",
    quota: "Chrome Web Store quota exceeded",
    api: "Chrome Web Store API request failed",
    network: "Chrome Web Store network request failed",
};

/// Chrome Web Store API client
pub struct ChromeStore {
    /// Item and publisher identifiers
    credentials: ChromeCredentials,

    /// HTTP client
    client: Client,

    /// Bearer token source
    tokens: Arc<dyn TokenSource>,

    /// API root, overridable for tests
    base_url: String,

    /// Linter
    web_ext: WebExt,
}

impl ChromeStore {
    /// Create a client that authenticates with the credentials' `wifConfig`
    pub fn new(credentials: ChromeCredentials) -> Result<Self> {
        ensure_credentials(&credentials)?;
        let tokens = GoogleTokenProvider::from_config(&credentials.wif_config, &[CHROME_WEBSTORE_SCOPE])?;
        Ok(Self::with_token_source(credentials, Arc::new(tokens)))
    }

    /// Create a client with an explicit token source
    pub fn with_token_source(credentials: ChromeCredentials, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            credentials,
            client: Client::new(),
            tokens,
            base_url: API_BASE_URL.to_string(),
            web_ext: WebExt::default(),
        }
    }

    /// Point the client at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Use a specific `web-ext` for linting
    pub fn with_web_ext(mut self, web_ext: WebExt) -> Self {
        self.web_ext = web_ext;
        self
    }

    fn item_url(&self) -> String {
        format!("{}/items/{}", self.base_url, self.credentials.item_id)
    }

    /// Make an authenticated API request
    async fn api_request(&self, method: Method, url: &str, body: Option<RequestBody>) -> Result<Option<Value>> {
        let token = self.tokens.access_token().await?;

        let mut request = self
            .client
            .request(method.clone(), url)
            .bearer_auth(token)
            .header("x-goog-api-version", API_VERSION_HEADER);

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

fn ensure_credentials(credentials: &ChromeCredentials) -> Result<()> {
    let wif_present = credentials
        .wif_config
        .as_object()
        .is_some_and(|o| !o.is_empty());

    if credentials.item_id.trim().is_empty() || credentials.publisher_id.trim().is_empty() || !wif_present {
        return Err(PublishError::authentication("Chrome credentials are incomplete"));
    }
    Ok(())
}

#[async_trait::async_trait]
impl StoreClient for ChromeStore {
    fn name(&self) -> &str {
        "Chrome Web Store"
    }

    fn store(&self) -> StoreKind {
        StoreKind::Chrome
    }

    fn is_available(&self) -> bool {
        ensure_credentials(&self.credentials).is_ok()
    }

    #[instrument(skip(self, manifest, options), fields(store = "chrome"))]
    async fn validate(&self, manifest: &Value, options: &ValidateOptions) -> Result<()> {
        let fields = manifest::as_object(manifest)?;
        manifest::require_fields(fields, &["name", "version", "manifest_version", "icons"])?;
        manifest::manifest_version(fields)?;
        manifest::require_icons(fields, "Manifest must specify at least one icon")?;

        if options.lint {
            if let Some(source_dir) = &options.source_dir {
                let artifacts = options
                    .artifacts_dir
                    .clone()
                    .unwrap_or_else(|| std::env::temp_dir().join("gatekeeper-webext"));
                self.web_ext.lint(source_dir, &artifacts).await.map_err(|e| {
                    PublishError::validation("Chrome manifest validation failed")
                        .with_context("output", e.context().get("output").cloned().unwrap_or_default())
                })?;
            }
        }

        debug!("manifest valid for Chrome Web Store");
        Ok(())
    }

    #[instrument(skip(self), fields(store = "chrome"))]
    async fn package(&self, source_dir: &Path, output: Option<&Path>) -> Result<PathBuf> {
        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| packaging::default_output(source_dir, "zip"));
        packaging::package_directory(source_dir, &output).await
    }

    #[instrument(skip(self), fields(store = "chrome", item = %self.credentials.item_id))]
    async fn upload(&self, artifact: &Path) -> Result<String> {
        let bytes = tokio::fs::read(artifact).await.map_err(|_| {
            PublishError::validation(format!("Artifact not found at path: {}", artifact.display()))
        })?;

        info!(size = bytes.len(), "uploading package to Chrome Web Store");
        let payload = self
            .api_request(Method::PUT, &self.item_url(), Some(RequestBody::Zip(bytes)))
            .await?;

        let upload_id = http::string_field(payload.as_ref(), &["item_id", "id"])
            .unwrap_or_else(|| self.credentials.item_id.clone());
        info!(upload_id = %upload_id, "package uploaded");
        Ok(upload_id)
    }

    #[instrument(skip(self, options), fields(store = "chrome"))]
    async fn publish(&self, upload_id: &str, options: &PublishOptions) -> Result<PublishResult> {
        if upload_id.trim().is_empty() {
            return Err(PublishError::validation("uploadId is required for publish"));
        }

        let target = options.target.as_deref().unwrap_or("default");
        if !ALLOWED_TARGETS.contains(&target) {
            return Err(PublishError::validation(format!("Unsupported publish target: {}", target)));
        }

        if let Some(rollout) = options.percentage_rollout {
            if rollout > 100 {
                return Err(PublishError::validation(
                    "percentageRollout must be between 0 and 100",
                ));
            }
        }

        let mut url = url::Url::parse(&format!("{}/publish", self.item_url()))
            .map_err(|e| PublishError::validation(format!("Invalid Chrome Web Store URL: {}", e)))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("publishTarget", target);
            if let Some(rollout) = options.percentage_rollout {
                query.append_pair("percentageRollout", &rollout.to_string());
            }
        }

        let payload = self
            .api_request(
                Method::POST,
                url.as_str(),
                Some(RequestBody::Json(json!({ "uploadId": upload_id }))),
            )
            .await?;

        let link = payload
            .as_ref()
            .and_then(|p| p.pointer("/item/crxVersionLink"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        info!(publish_target = target, "publish requested");
        Ok(PublishResult {
            success: true,
            url: link,
            submission_id: Some(upload_id.to_string()),
            status: http::string_field(payload.as_ref(), &["status"]),
        })
    }

    #[instrument(skip(self), fields(store = "chrome"))]
    async fn cancel(&self, upload_id: Option<&str>) -> Result<CancelResult> {
        let upload_id = upload_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| PublishError::validation("uploadId is required to cancel publish"))?;

        let url = format!("{}/edits/{}:cancelPublish", self.item_url(), upload_id);
        self.api_request(Method::POST, &url, None).await?;

        info!(upload_id, "publish cancelled");
        Ok(CancelResult { cancelled: true })
    }
}

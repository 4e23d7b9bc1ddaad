//! Firefox Add-ons (AMO) integration
//!
//! AMO signing goes through Mozilla's `web-ext sign`, so "upload" is local:
//! it only checks the artifact, and `publish` signs the source directory.

use std::path::{Path, PathBuf};

use gatekeeper_core::config::FirefoxCredentials;
use gatekeeper_core::{PublishError, Result, StoreKind};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::manifest;
use crate::packaging;
use crate::traits::StoreClient;
use crate::types::*;
use crate::webext::{SignRequest, WebExt};

const DEFAULT_CHANNEL: &str = "listed";
const ALLOWED_CHANNELS: [&str; 2] = ["listed", "unlisted"];

/// Firefox AMO client
pub struct FirefoxStore {
    credentials: FirefoxCredentials,
    web_ext: WebExt,
}

impl FirefoxStore {
    pub fn new(credentials: FirefoxCredentials) -> Result<Self> {
        ensure_credentials(&credentials)?;
        Ok(Self {
            credentials,
            web_ext: WebExt::default(),
        })
    }

    /// Use a specific `web-ext`
    pub fn with_web_ext(mut self, web_ext: WebExt) -> Self {
        self.web_ext = web_ext;
        self
    }
}

fn ensure_credentials(credentials: &FirefoxCredentials) -> Result<()> {
    if credentials.api_key.trim().is_empty() || credentials.api_secret.trim().is_empty() {
        return Err(PublishError::authentication("Firefox credentials are incomplete"));
    }
    Ok(())
}

fn ensure_path_exists(path: &Path, message: &str) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(PublishError::validation(message).with_context("path", path.display().to_string()))
    }
}

#[async_trait::async_trait]
impl StoreClient for FirefoxStore {
    fn name(&self) -> &str {
        "Firefox Add-ons"
    }

    fn store(&self) -> StoreKind {
        StoreKind::Firefox
    }

    fn is_available(&self) -> bool {
        ensure_credentials(&self.credentials).is_ok() && self.web_ext.is_installed()
    }

    #[instrument(skip(self, manifest, options), fields(store = "firefox"))]
    async fn validate(&self, manifest: &Value, options: &ValidateOptions) -> Result<()> {
        let fields = manifest::as_object(manifest)?;
        manifest::require_fields(fields, &["name", "version", "manifest_version"])?;
        manifest::manifest_version(fields)?;

        if options.lint {
            if let Some(source_dir) = &options.source_dir {
                let artifacts = options
                    .artifacts_dir
                    .clone()
                    .unwrap_or_else(|| std::env::temp_dir().join("gatekeeper-firefox-lint"));
                self.web_ext.lint(source_dir, &artifacts).await.map_err(|e| {
                    PublishError::validation("Firefox manifest validation failed")
                        .with_context("output", e.context().get("output").cloned().unwrap_or_default())
                })?;
            }
        }

        debug!("manifest valid for Firefox Add-ons");
        Ok(())
    }

    #[instrument(skip(self), fields(store = "firefox"))]
    async fn package(&self, source_dir: &Path, output: Option<&Path>) -> Result<PathBuf> {
        ensure_path_exists(source_dir, "Manifest directory not found for packaging")?;

        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| packaging::default_output(source_dir, "xpi"));
        packaging::package_directory(source_dir, &output).await
    }

    async fn upload(&self, artifact: &Path) -> Result<String> {
        ensure_path_exists(
            artifact,
            &format!("Artifact not found at path: {}", artifact.display()),
        )?;
        Ok(artifact.display().to_string())
    }

    #[instrument(skip(self, options), fields(store = "firefox"))]
    async fn publish(&self, upload_id: &str, options: &PublishOptions) -> Result<PublishResult> {
        if upload_id.trim().is_empty() {
            return Err(PublishError::validation("uploadId is required for publish"));
        }

        let channel = options.channel.as_deref().unwrap_or(DEFAULT_CHANNEL);
        if !ALLOWED_CHANNELS.contains(&channel) {
            return Err(PublishError::validation(format!(
                "Unsupported Firefox channel: {}",
                channel
            )));
        }

        let source_dir = options
            .source_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(upload_id));
        ensure_path_exists(&source_dir, "Source directory not found for Firefox publish")?;

        let artifacts_dir = options
            .artifacts_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("gatekeeper-firefox-sign"));

        let url = self
            .web_ext
            .sign(&SignRequest {
                source_dir: &source_dir,
                channel,
                artifacts_dir: &artifacts_dir,
                addon_id: options.addon_id.as_deref(),
                api_key: &self.credentials.api_key,
                api_secret: &self.credentials.api_secret,
            })
            .await?;

        Ok(PublishResult {
            success: true,
            url,
            submission_id: None,
            status: None,
        })
    }

    async fn cancel(&self, _upload_id: Option<&str>) -> Result<CancelResult> {
        Err(PublishError::api(
            "Firefox AMO does not support cancelling publish operations",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_core::ErrorKind;
    use serde_json::json;
    use tempfile::TempDir;

    fn credentials() -> FirefoxCredentials {
        FirefoxCredentials {
            api_key: "user:123".into(),
            api_secret: "secret".into(),
        }
    }

    #[cfg(unix)]
    fn fake_web_ext(dir: &Path, script: &str) -> WebExt {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("web-ext");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        WebExt::new(path)
    }

    #[test]
    fn test_incomplete_credentials() {
        let err = FirefoxStore::new(FirefoxCredentials::default()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(err.message(), "Firefox credentials are incomplete");
    }

    #[tokio::test]
    async fn test_validate_manifest() {
        let store = FirefoxStore::new(credentials()).unwrap();
        let options = ValidateOptions::default();

        let manifest = json!({ "name": "Ext", "version": "1.0", "manifest_version": 2 });
        assert!(store.validate(&manifest, &options).await.is_ok());

        let manifest = json!({ "name": "Ext", "manifest_version": 2 });
        let err = store.validate(&manifest, &options).await.unwrap_err();
        assert_eq!(err.message(), "Manifest missing required fields: version");
    }

    #[tokio::test]
    async fn test_package_requires_source_dir() {
        let store = FirefoxStore::new(credentials()).unwrap();
        let dir = TempDir::new().unwrap();

        let err = store.package(&dir.path().join("missing"), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_upload_is_local() {
        let store = FirefoxStore::new(credentials()).unwrap();
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("ext.xpi");
        std::fs::write(&artifact, b"PK").unwrap();

        assert_eq!(store.upload(&artifact).await.unwrap(), artifact.display().to_string());
        assert_eq!(
            store.upload(&dir.path().join("nope.xpi")).await.unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    #[tokio::test]
    async fn test_publish_rejects_unknown_channel() {
        let store = FirefoxStore::new(credentials()).unwrap();
        let options = PublishOptions {
            channel: Some("beta".into()),
            ..Default::default()
        };
        let err = store.publish("src", &options).await.unwrap_err();
        assert_eq!(err.message(), "Unsupported Firefox channel: beta");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_publish_returns_signed_url() {
        let dir = TempDir::new().unwrap();
        let web_ext = fake_web_ext(
            dir.path(),
            r#"[ "$WEB_EXT_API_KEY" = "user:123" ] || exit 3
echo "Signed: https://addons.mozilla.org/firefox/downloads/file/1/ext.xpi done""#,
        );
        let store = FirefoxStore::new(credentials()).unwrap().with_web_ext(web_ext);

        let options = PublishOptions {
            source_dir: Some(dir.path().to_path_buf()),
            artifacts_dir: Some(dir.path().join("artifacts")),
            ..Default::default()
        };
        let result = store.publish("ignored", &options).await.unwrap();

        assert!(result.success);
        assert_eq!(
            result.url.as_deref(),
            Some("https://addons.mozilla.org/firefox/downloads/file/1/ext.xpi")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_publish_classifies_failures() {
        let dir = TempDir::new().unwrap();
        let web_ext = fake_web_ext(dir.path(), "echo 'Server responded 429 Too Many Requests' >&2; exit 1");
        let store = FirefoxStore::new(credentials()).unwrap().with_web_ext(web_ext);

        let options = PublishOptions {
            source_dir: Some(dir.path().to_path_buf()),
            artifacts_dir: Some(dir.path().join("artifacts")),
            ..Default::default()
        };
        let err = store.publish("ignored", &options).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
        assert!(err.context()["output"].as_str().unwrap().contains("429"));
    }

    #[tokio::test]
    async fn test_cancel_is_unsupported() {
        let store = FirefoxStore::new(credentials()).unwrap();
        let err = store.cancel(Some("id")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Api);
    }
}

//! Per-store publish pipeline
//!
//! Runs validate -> package -> upload -> publish for one store. Only the
//! remote stages go through the retry policy; validation and packaging fail
//! on the first error.

use std::fmt;
use std::future::ready;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use gatekeeper_core::{
    redact, CancelToken, MetricsCollector, PublishError, Result, RetryOptions, RetryPolicy, StoreKind,
};
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::manifest;
use crate::traits::StoreClient;
use crate::types::*;

/// A step of the submission lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Validate,
    Package,
    Upload,
    Publish,
    Cancel,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::Package => "package",
            Stage::Upload => "upload",
            Stage::Publish => "publish",
            Stage::Cancel => "cancel",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The stage a store failed at, and why
#[derive(Debug, Clone)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: PublishError,
}

/// What happened for one store
#[derive(Debug, Clone)]
pub struct StoreOutcome {
    pub store: StoreKind,
    pub upload_id: Option<String>,
    pub artifact: Option<PathBuf>,
    pub duration: Duration,
    pub result: std::result::Result<PublishResult, StageFailure>,
}

impl StoreOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        self.result.as_ref().err()
    }
}

/// Inputs for a full publish run
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    /// Path to `manifest.json`; its directory is the extension source
    pub manifest_path: PathBuf,

    /// Where packaged artifacts go; next to the source when unset
    pub output_dir: Option<PathBuf>,

    /// Lint with `web-ext` during validation
    pub lint: bool,

    pub options: PublishOptions,
}

impl PublishRequest {
    pub fn source_dir(&self) -> PathBuf {
        source_dir_of(&self.manifest_path)
    }

    fn artifact_path(&self, store: StoreKind) -> Option<PathBuf> {
        let ext = match store {
            StoreKind::Firefox => "xpi",
            StoreKind::Chrome | StoreKind::Edge => "zip",
        };
        self.output_dir
            .as_ref()
            .map(|dir| dir.join(format!("extension-{}.{}", store, ext)))
    }
}

/// What a run got through before it stopped
#[derive(Debug, Default)]
struct Progress {
    upload_id: Option<String>,
    artifact: Option<PathBuf>,
}

/// Drives store clients through their lifecycle
pub struct PublishPipeline {
    policy: RetryPolicy,
    metrics: Arc<MetricsCollector>,
    cancel: CancelToken,
}

impl PublishPipeline {
    pub fn new(policy: RetryPolicy, metrics: Arc<MetricsCollector>, cancel: CancelToken) -> Self {
        Self {
            policy,
            metrics,
            cancel,
        }
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Publish to one store
    ///
    /// Failures are captured in the outcome rather than returned, so callers
    /// can move on to the next store.
    #[instrument(skip_all, fields(store = %client.store()))]
    pub async fn publish(&self, client: &dyn StoreClient, request: &PublishRequest) -> StoreOutcome {
        let store = client.store();
        let started = Instant::now();
        self.metrics.record_publish_attempt(store);

        let mut progress = Progress::default();
        let result = self.run_stages(client, request, &mut progress).await;

        let outcome = StoreOutcome {
            store,
            upload_id: progress.upload_id,
            artifact: progress.artifact,
            duration: started.elapsed(),
            result,
        };

        match &outcome.result {
            Ok(result) => {
                self.metrics.record_publish_success(store, outcome.duration);
                info!(
                    duration_ms = outcome.duration.as_millis() as u64,
                    url = result.url.as_deref().unwrap_or(""),
                    "published"
                );
            }
            Err(failure) => {
                if failure.stage == Stage::Upload {
                    self.metrics.record_upload_failure(store, &failure.error);
                } else {
                    self.metrics.record_publish_failure(store, &failure.error);
                }
                error!(
                    stage = %failure.stage,
                    kind = %failure.error.kind(),
                    error = %redact(failure.error.message()),
                    "publish failed"
                );
            }
        }

        outcome
    }

    async fn run_stages(
        &self,
        client: &dyn StoreClient,
        request: &PublishRequest,
        progress: &mut Progress,
    ) -> std::result::Result<PublishResult, StageFailure> {
        let store = client.store();
        let source_dir = request.source_dir();

        self.check_cancelled(Stage::Validate)?;
        validate(client, &request.manifest_path, request.lint, request.output_dir.clone())
            .await
            .map_err(at(Stage::Validate))?;
        info!("manifest valid");

        self.check_cancelled(Stage::Package)?;
        let output = request.artifact_path(store);
        let artifact = client
            .package(&source_dir, output.as_deref())
            .await
            .map_err(at(Stage::Package))?;
        info!(artifact = %artifact.display(), "packaged");
        progress.artifact = Some(artifact.clone());

        let upload_id = self
            .policy
            .execute(|_| client.upload(&artifact), &self.retry_options(store))
            .await
            .map_err(at(Stage::Upload))?;
        info!(upload_id = %upload_id, "uploaded");
        progress.upload_id = Some(upload_id.clone());

        let mut options = request.options.clone();
        if options.source_dir.is_none() {
            options.source_dir = Some(source_dir);
        }
        if options.artifacts_dir.is_none() {
            options.artifacts_dir = request.output_dir.clone();
        }

        self.policy
            .execute(|_| client.publish(&upload_id, &options), &self.retry_options(store))
            .await
            .map_err(at(Stage::Publish))
    }

    /// Withdraw a pending submission
    #[instrument(skip_all, fields(store = %client.store()))]
    pub async fn cancel_submission(&self, client: &dyn StoreClient, upload_id: Option<&str>) -> Result<CancelResult> {
        if self.cancel.is_cancelled() {
            return Err(self.cancel.abort_error());
        }

        let result = self
            .policy
            .execute(|_| client.cancel(upload_id), &self.retry_options(client.store()))
            .await;

        match &result {
            Ok(_) => info!(upload_id = upload_id.unwrap_or("draft"), "submission cancelled"),
            Err(e) => error!(kind = %e.kind(), error = %redact(e.message()), "cancel failed"),
        }
        result
    }

    /// Validate the manifest for one store without packaging or uploading
    #[instrument(skip_all, fields(store = %client.store()))]
    pub async fn validate_only(&self, client: &dyn StoreClient, manifest_path: &Path, lint: bool) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(self.cancel.abort_error());
        }
        validate(client, manifest_path, lint, None).await
    }

    fn retry_options(&self, store: StoreKind) -> RetryOptions {
        let metrics = Arc::clone(&self.metrics);
        RetryOptions::new()
            .cancel_token(self.cancel.clone())
            .on_retry(move |_event| {
                metrics.record_retry(store);
                ready(())
            })
    }

    fn check_cancelled(&self, stage: Stage) -> std::result::Result<(), StageFailure> {
        if self.cancel.is_cancelled() {
            Err(StageFailure {
                stage,
                error: self.cancel.abort_error(),
            })
        } else {
            Ok(())
        }
    }
}

async fn validate(
    client: &dyn StoreClient,
    manifest_path: &Path,
    lint: bool,
    artifacts_dir: Option<PathBuf>,
) -> Result<()> {
    let manifest = manifest::read_manifest(manifest_path).await?;
    let options = ValidateOptions {
        source_dir: Some(source_dir_of(manifest_path)),
        lint,
        artifacts_dir,
    };
    client.validate(&manifest, &options).await
}

fn source_dir_of(manifest_path: &Path) -> PathBuf {
    match manifest_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn at(stage: Stage) -> impl Fn(PublishError) -> StageFailure {
    move |error| StageFailure { stage, error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_core::{ErrorKind, RetryConfig};
    use serde_json::Value;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Scripted store: each remote call pops the next scripted error, if any
    #[derive(Default)]
    struct ScriptedStore {
        validate_calls: AtomicU32,
        upload_calls: AtomicU32,
        publish_calls: AtomicU32,
        cancel_calls: AtomicU32,
        validate_error: Option<PublishError>,
        upload_errors: Mutex<Vec<PublishError>>,
        publish_errors: Mutex<Vec<PublishError>>,
        cancel_errors: Mutex<Vec<PublishError>>,
        seen_source_dir: Mutex<Option<PathBuf>>,
    }

    fn pop(errors: &Mutex<Vec<PublishError>>) -> Result<()> {
        match errors.lock().unwrap().pop() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    #[async_trait::async_trait]
    impl StoreClient for ScriptedStore {
        fn name(&self) -> &str {
            "Scripted"
        }

        fn store(&self) -> StoreKind {
            StoreKind::Edge
        }

        fn is_available(&self) -> bool {
            true
        }

        async fn validate(&self, manifest: &Value, _options: &ValidateOptions) -> Result<()> {
            self.validate_calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(manifest["name"], "Ext");
            match &self.validate_error {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }

        async fn package(&self, source_dir: &Path, output: Option<&Path>) -> Result<PathBuf> {
            Ok(output.map(Path::to_path_buf).unwrap_or_else(|| source_dir.join("ext.zip")))
        }

        async fn upload(&self, _artifact: &Path) -> Result<String> {
            self.upload_calls.fetch_add(1, Ordering::SeqCst);
            pop(&self.upload_errors)?;
            Ok("upload-1".into())
        }

        async fn publish(&self, upload_id: &str, options: &PublishOptions) -> Result<PublishResult> {
            self.publish_calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_source_dir.lock().unwrap() = options.source_dir.clone();
            pop(&self.publish_errors)?;
            Ok(PublishResult {
                success: true,
                url: None,
                submission_id: Some(upload_id.to_string()),
                status: Some("submitted".into()),
            })
        }

        async fn cancel(&self, _upload_id: Option<&str>) -> Result<CancelResult> {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            pop(&self.cancel_errors)?;
            Ok(CancelResult { cancelled: true })
        }
    }

    fn pipeline(cancel: CancelToken) -> PublishPipeline {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        });
        PublishPipeline::new(policy, Arc::new(MetricsCollector::new()), cancel)
    }

    fn request(dir: &TempDir) -> PublishRequest {
        let manifest_path = dir.path().join("manifest.json");
        std::fs::write(&manifest_path, r#"{ "name": "Ext", "version": "1.0" }"#).unwrap();
        PublishRequest {
            manifest_path,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_successful_publish() {
        let dir = TempDir::new().unwrap();
        let store = ScriptedStore::default();
        let pipeline = pipeline(CancelToken::new());

        let outcome = pipeline.publish(&store, &request(&dir)).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.upload_id.as_deref(), Some("upload-1"));
        assert_eq!(outcome.artifact, Some(dir.path().join("ext.zip")));
        assert_eq!(
            store.seen_source_dir.lock().unwrap().as_deref(),
            Some(dir.path())
        );

        let snapshot = pipeline.metrics().snapshot();
        assert_eq!(snapshot.publish_attempts, 1);
        assert_eq!(snapshot.publish_successes, 1);
        assert_eq!(snapshot.retries, 0);
    }

    #[tokio::test]
    async fn test_validation_failure_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let store = ScriptedStore {
            validate_error: Some(PublishError::validation("bad manifest")),
            ..Default::default()
        };
        let pipeline = pipeline(CancelToken::new());

        let outcome = pipeline.publish(&store, &request(&dir)).await;

        let failure = outcome.failure().unwrap();
        assert_eq!(failure.stage, Stage::Validate);
        assert_eq!(failure.error.message(), "bad manifest");
        assert_eq!(store.validate_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.upload_calls.load(Ordering::SeqCst), 0);

        let snapshot = pipeline.metrics().snapshot();
        assert_eq!(snapshot.publish_failures, 1);
        assert_eq!(snapshot.failures_by_kind.validation_failures, 1);
    }

    #[tokio::test]
    async fn test_missing_manifest_fails_validation() {
        let dir = TempDir::new().unwrap();
        let store = ScriptedStore::default();
        let request = PublishRequest {
            manifest_path: dir.path().join("manifest.json"),
            ..Default::default()
        };

        let outcome = pipeline(CancelToken::new()).publish(&store, &request).await;

        assert_eq!(outcome.failure().unwrap().stage, Stage::Validate);
        assert_eq!(store.validate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transient_upload_errors_are_retried() {
        let dir = TempDir::new().unwrap();
        let store = ScriptedStore {
            upload_errors: Mutex::new(vec![
                PublishError::network("reset"),
                PublishError::api("unavailable").with_status(503),
            ]),
            ..Default::default()
        };
        let pipeline = pipeline(CancelToken::new());

        let outcome = pipeline.publish(&store, &request(&dir)).await;

        assert!(outcome.is_success());
        assert_eq!(store.upload_calls.load(Ordering::SeqCst), 3);

        let snapshot = pipeline.metrics().snapshot();
        assert_eq!(snapshot.retries, 2);
        assert_eq!(snapshot.per_store["edge"].retries, 2);
    }

    #[tokio::test]
    async fn test_exhausted_upload_records_upload_failure() {
        let dir = TempDir::new().unwrap();
        let store = ScriptedStore {
            upload_errors: Mutex::new(vec![
                PublishError::quota_exceeded("slow down"),
                PublishError::quota_exceeded("slow down"),
                PublishError::quota_exceeded("slow down"),
            ]),
            ..Default::default()
        };
        let pipeline = pipeline(CancelToken::new());

        let outcome = pipeline.publish(&store, &request(&dir)).await;

        let failure = outcome.failure().unwrap();
        assert_eq!(failure.stage, Stage::Upload);
        assert_eq!(failure.error.kind(), ErrorKind::QuotaExceeded);
        assert_eq!(store.publish_calls.load(Ordering::SeqCst), 0);

        let snapshot = pipeline.metrics().snapshot();
        assert_eq!(snapshot.upload_failures, 1);
        assert_eq!(snapshot.failures_by_kind.quota_errors, 1);
    }

    #[tokio::test]
    async fn test_publish_auth_failure_stops_immediately() {
        let dir = TempDir::new().unwrap();
        let store = ScriptedStore {
            publish_errors: Mutex::new(vec![PublishError::authentication("expired")]),
            ..Default::default()
        };

        let outcome = pipeline(CancelToken::new()).publish(&store, &request(&dir)).await;

        let failure = outcome.failure().unwrap();
        assert_eq!(failure.stage, Stage::Publish);
        assert_eq!(outcome.upload_id.as_deref(), Some("upload-1"));
        assert_eq!(store.publish_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_validation() {
        let dir = TempDir::new().unwrap();
        let store = ScriptedStore::default();
        let cancel = CancelToken::new();
        cancel.cancel();

        let outcome = pipeline(cancel).publish(&store, &request(&dir)).await;

        let failure = outcome.failure().unwrap();
        assert_eq!(failure.stage, Stage::Validate);
        assert!(failure.error.is_aborted());
        assert_eq!(store.validate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_submission_retries_server_errors() {
        let store = ScriptedStore {
            cancel_errors: Mutex::new(vec![PublishError::api("bad gateway").with_status(502)]),
            ..Default::default()
        };

        let result = pipeline(CancelToken::new())
            .cancel_submission(&store, Some("sub-1"))
            .await
            .unwrap();

        assert!(result.cancelled);
        assert_eq!(store.cancel_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_validate_only() {
        let dir = TempDir::new().unwrap();
        let store = ScriptedStore::default();
        let request = request(&dir);

        pipeline(CancelToken::new())
            .validate_only(&store, &request.manifest_path, false)
            .await
            .unwrap();
        assert_eq!(store.validate_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.upload_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_artifact_path_uses_store_extension() {
        let request = PublishRequest {
            output_dir: Some(PathBuf::from("dist")),
            ..Default::default()
        };
        assert_eq!(
            request.artifact_path(StoreKind::Firefox),
            Some(PathBuf::from("dist/extension-firefox.xpi"))
        );
        assert_eq!(
            request.artifact_path(StoreKind::Chrome),
            Some(PathBuf::from("dist/extension-chrome.zip"))
        );
    }
}

//! Store client trait

use std::path::{Path, PathBuf};

use gatekeeper_core::{Result, StoreKind};
use serde_json::Value;

use crate::types::*;

/// Trait for browser extension store clients
///
/// Each store implements the full submission lifecycle. Every failure is a
/// classified `PublishError`, which is what the retry policy inspects.
#[async_trait::async_trait]
pub trait StoreClient: Send + Sync {
    /// Get the store name
    fn name(&self) -> &str;

    /// Get the store kind
    fn store(&self) -> StoreKind;

    /// Check if the client is configured and its tooling is present
    fn is_available(&self) -> bool;

    /// Check a parsed `manifest.json` against this store's requirements
    async fn validate(&self, manifest: &Value, options: &ValidateOptions) -> Result<()>;

    /// Zip the extension source directory
    ///
    /// Returns the path of the created archive.
    async fn package(&self, source_dir: &Path, output: Option<&Path>) -> Result<PathBuf>;

    /// Upload a packaged artifact
    ///
    /// Returns the identifier that `publish` and `cancel` expect.
    async fn upload(&self, artifact: &Path) -> Result<String>;

    /// Submit an upload for review or release
    async fn publish(&self, upload_id: &str, options: &PublishOptions) -> Result<PublishResult>;

    /// Withdraw a pending submission
    async fn cancel(&self, upload_id: Option<&str>) -> Result<CancelResult>;
}

//! Common types for store operations

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Options for manifest validation
#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    /// Extension source directory, used for directory checks and linting
    pub source_dir: Option<PathBuf>,

    /// Run `web-ext lint` against `source_dir`
    pub lint: bool,

    /// Where `web-ext` may write its artifacts
    pub artifacts_dir: Option<PathBuf>,
}

/// Options for publishing an uploaded item
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// Chrome publish target (`default` or `trustedTesters`)
    pub target: Option<String>,

    /// Chrome staged rollout percentage (0-100)
    pub percentage_rollout: Option<u32>,

    /// Firefox channel (`listed` or `unlisted`)
    pub channel: Option<String>,

    /// Firefox source directory to sign
    pub source_dir: Option<PathBuf>,

    /// Firefox add-on id
    pub addon_id: Option<String>,

    /// Edge certification notes
    pub notes: Option<String>,

    /// Where `web-ext` may write signed artifacts
    pub artifacts_dir: Option<PathBuf>,
}

/// Result of a publish call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResult {
    pub success: bool,

    /// Listing or signed-artifact URL, when the store reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Submission identifier, when the store assigns one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<String>,

    /// Store-reported submission status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Result of a cancel call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResult {
    pub cancelled: bool,
}

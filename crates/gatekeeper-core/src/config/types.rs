//! Configuration types

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PublishError;
use crate::retry::RetryConfig;

/// A supported extension store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Chrome,
    Firefox,
    Edge,
}

impl StoreKind {
    /// All stores, in publishing order
    pub const ALL: [StoreKind; 3] = [StoreKind::Chrome, StoreKind::Firefox, StoreKind::Edge];

    /// Identifier used in config files, labels and CLI arguments
    pub fn as_str(self) -> &'static str {
        match self {
            StoreKind::Chrome => "chrome",
            StoreKind::Firefox => "firefox",
            StoreKind::Edge => "edge",
        }
    }

    /// Human-readable store name
    pub fn display_name(self) -> &'static str {
        match self {
            StoreKind::Chrome => "Chrome Web Store",
            StoreKind::Firefox => "Firefox Add-ons",
            StoreKind::Edge => "Microsoft Edge Add-ons",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = PublishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" => Ok(StoreKind::Chrome),
            "firefox" => Ok(StoreKind::Firefox),
            "edge" => Ok(StoreKind::Edge),
            other => Err(PublishError::validation(format!("Unsupported store: {}", other))),
        }
    }
}

/// Main configuration, read from `.gatekeeperrc.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Token used to file error reports
    pub github_token: String,

    /// Repository receiving error reports, as `owner/name`
    pub repo: String,

    /// Stores to publish to
    pub browsers: Vec<String>,

    /// Per-store credentials
    pub credentials: Credentials,

    /// Retry tuning for store requests
    pub retry: RetrySettings,
}

impl Config {
    /// Skeleton written by `gatekeeper init`
    pub fn template() -> Self {
        Self {
            github_token: String::new(),
            repo: String::new(),
            browsers: Vec::new(),
            credentials: Credentials {
                chrome: Some(ChromeCredentials::default()),
                firefox: Some(FirefoxCredentials::default()),
                edge: Some(EdgeCredentials::default()),
            },
            retry: RetrySettings::default(),
        }
    }

    /// Configured stores, skipping entries that do not name one
    pub fn stores(&self) -> Vec<StoreKind> {
        self.browsers.iter().filter_map(|b| b.parse().ok()).collect()
    }

    /// Split `repo` into owner and name
    pub fn repo_parts(&self) -> Option<(&str, &str)> {
        self.repo
            .split_once('/')
            .filter(|(owner, name)| !owner.is_empty() && !name.is_empty())
    }

    /// Retry configuration derived from the `retry` block
    pub fn retry_config(&self) -> RetryConfig {
        self.retry.to_retry_config()
    }

    /// Apply environment-sourced overrides
    pub fn apply_overrides(&mut self, github_token: Option<String>) {
        if let Some(token) = github_token.filter(|t| !t.trim().is_empty()) {
            self.github_token = token;
        }
    }
}

/// Credentials for each store; only listed browsers need theirs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chrome: Option<ChromeCredentials>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub firefox: Option<FirefoxCredentials>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge: Option<EdgeCredentials>,
}

/// Chrome Web Store credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChromeCredentials {
    pub publisher_id: String,
    pub item_id: String,
    /// Google credential configuration (service account or workload identity federation)
    pub wif_config: Value,
}

impl Default for ChromeCredentials {
    fn default() -> Self {
        Self {
            publisher_id: String::new(),
            item_id: String::new(),
            wif_config: Value::Object(Map::new()),
        }
    }
}

/// Firefox AMO API credentials
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FirefoxCredentials {
    pub api_key: String,
    pub api_secret: String,
}

/// Microsoft Partner Center credentials
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EdgeCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub product_id: String,
    /// Azure AD tenant, `organizations` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

/// Retry tuning as written in the config file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            backoff_multiplier: defaults.backoff_multiplier,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

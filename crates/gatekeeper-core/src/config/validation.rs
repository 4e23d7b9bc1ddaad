//! Configuration validation

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::ConfigError;

use super::types::{Config, StoreKind};

static GITHUB_TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ghp_[A-Za-z0-9]+$").expect("Invalid regex"));

static REPO_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+$").expect("Invalid regex"));

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    debug!("validating configuration");
    validate_github(config)?;
    let stores = validate_browsers(config)?;
    validate_credentials(config, &stores)?;
    validate_retry(config)?;
    debug!(stores = stores.len(), "configuration validation passed");
    Ok(())
}

fn validate_github(config: &Config) -> Result<(), ConfigError> {
    if !GITHUB_TOKEN_PATTERN.is_match(&config.github_token) {
        return Err(ConfigError::invalid(
            "githubToken",
            "must be a string that starts with \"ghp_\"",
        ));
    }

    if !REPO_PATTERN.is_match(&config.repo) {
        return Err(ConfigError::invalid(
            "repo",
            "must be in the format \"owner/repo\" and contain only alphanumeric, dash, underscore, or dot characters",
        ));
    }

    Ok(())
}

fn validate_browsers(config: &Config) -> Result<Vec<StoreKind>, ConfigError> {
    if config.browsers.is_empty() {
        return Err(ConfigError::invalid("browsers", "must be a non-empty array"));
    }

    let mut seen = HashSet::new();
    let mut stores = Vec::with_capacity(config.browsers.len());
    for (i, browser) in config.browsers.iter().enumerate() {
        let store = match browser.as_str() {
            "chrome" => StoreKind::Chrome,
            "firefox" => StoreKind::Firefox,
            "edge" => StoreKind::Edge,
            other => {
                return Err(ConfigError::invalid(
                    format!("browsers[{}]", i),
                    format!("unsupported browser \"{}\"", other),
                ))
            }
        };

        if !seen.insert(store) {
            return Err(ConfigError::invalid(
                format!("browsers[{}]", i),
                format!("duplicate browser entry \"{}\"", browser),
            ));
        }
        stores.push(store);
    }

    Ok(stores)
}

fn validate_credentials(config: &Config, stores: &[StoreKind]) -> Result<(), ConfigError> {
    let creds = &config.credentials;

    for store in stores {
        match store {
            StoreKind::Chrome => {
                let chrome = creds
                    .chrome
                    .as_ref()
                    .ok_or_else(|| missing_credentials(*store))?;
                require_non_empty(*store, "publisherId", &chrome.publisher_id)?;
                require_non_empty(*store, "itemId", &chrome.item_id)?;
                if !chrome.wif_config.is_object() {
                    return Err(ConfigError::invalid(
                        "credentials.chrome.wifConfig",
                        "must be an object",
                    ));
                }
            }
            StoreKind::Firefox => {
                let firefox = creds
                    .firefox
                    .as_ref()
                    .ok_or_else(|| missing_credentials(*store))?;
                require_non_empty(*store, "apiKey", &firefox.api_key)?;
                require_non_empty(*store, "apiSecret", &firefox.api_secret)?;
            }
            StoreKind::Edge => {
                let edge = creds
                    .edge
                    .as_ref()
                    .ok_or_else(|| missing_credentials(*store))?;
                require_non_empty(*store, "clientId", &edge.client_id)?;
                require_non_empty(*store, "clientSecret", &edge.client_secret)?;
                require_non_empty(*store, "productId", &edge.product_id)?;
            }
        }
    }

    Ok(())
}

fn validate_retry(config: &Config) -> Result<(), ConfigError> {
    let retry = &config.retry;

    if retry.max_attempts == 0 {
        return Err(ConfigError::invalid("retry.maxAttempts", "must be at least 1"));
    }

    if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier <= 0.0 {
        return Err(ConfigError::invalid(
            "retry.backoffMultiplier",
            "must be a positive number",
        ));
    }

    if retry.max_delay_ms < retry.initial_delay_ms {
        return Err(ConfigError::invalid(
            "retry.maxDelayMs",
            "must not be smaller than initialDelayMs",
        ));
    }

    Ok(())
}

fn missing_credentials(store: StoreKind) -> ConfigError {
    ConfigError::MissingField(format!("credentials.{}", store))
}

fn require_non_empty(store: StoreKind, field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::invalid(
            format!("credentials.{}.{}", store, field),
            "cannot be empty",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChromeCredentials, EdgeCredentials, FirefoxCredentials};
    use serde_json::json;

    fn valid_config() -> Config {
        let mut config = Config::template();
        config.github_token = "ghp_abcdef123456".to_string();
        config.repo = "acme/extension".to_string();
        config.browsers = vec!["chrome".into(), "firefox".into(), "edge".into()];
        config.credentials.chrome = Some(ChromeCredentials {
            publisher_id: "publisher".into(),
            item_id: "item".into(),
            wif_config: json!({ "type": "service_account" }),
        });
        config.credentials.firefox = Some(FirefoxCredentials {
            api_key: "key".into(),
            api_secret: "secret".into(),
        });
        config.credentials.edge = Some(EdgeCredentials {
            client_id: "client".into(),
            client_secret: "secret".into(),
            product_id: "product".into(),
            tenant_id: None,
        });
        config
    }

    fn field_of(err: ConfigError) -> String {
        match err {
            ConfigError::InvalidValue { field, .. } => field,
            ConfigError::MissingField(field) => field,
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_template_is_not_valid() {
        assert!(validate_config(&Config::template()).is_err());
    }

    #[test]
    fn test_rejects_bad_github_token() {
        let mut config = valid_config();
        config.github_token = "token".into();
        assert_eq!(field_of(validate_config(&config).unwrap_err()), "githubToken");
    }

    #[test]
    fn test_rejects_bad_repo() {
        let mut config = valid_config();
        config.repo = "owner/repo/extra".into();
        assert_eq!(field_of(validate_config(&config).unwrap_err()), "repo");
    }

    #[test]
    fn test_rejects_empty_browsers() {
        let mut config = valid_config();
        config.browsers.clear();
        assert_eq!(field_of(validate_config(&config).unwrap_err()), "browsers");
    }

    #[test]
    fn test_rejects_unsupported_browser() {
        let mut config = valid_config();
        config.browsers.push("safari".into());
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("unsupported browser \"safari\""));
    }

    #[test]
    fn test_rejects_duplicate_browser() {
        let mut config = valid_config();
        config.browsers = vec!["chrome".into(), "chrome".into()];
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_rejects_missing_store_credentials() {
        let mut config = valid_config();
        config.credentials.firefox = None;
        assert_eq!(
            field_of(validate_config(&config).unwrap_err()),
            "credentials.firefox"
        );
    }

    #[test]
    fn test_unlisted_store_needs_no_credentials() {
        let mut config = valid_config();
        config.browsers = vec!["chrome".into()];
        config.credentials.firefox = None;
        config.credentials.edge = None;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_rejects_blank_credential_field() {
        let mut config = valid_config();
        if let Some(edge) = config.credentials.edge.as_mut() {
            edge.client_secret = "   ".into();
        }
        assert_eq!(
            field_of(validate_config(&config).unwrap_err()),
            "credentials.edge.clientSecret"
        );
    }

    #[test]
    fn test_rejects_non_object_wif_config() {
        let mut config = valid_config();
        if let Some(chrome) = config.credentials.chrome.as_mut() {
            chrome.wif_config = json!("inline");
        }
        assert_eq!(
            field_of(validate_config(&config).unwrap_err()),
            "credentials.chrome.wifConfig"
        );
    }

    #[test]
    fn test_rejects_bad_retry_settings() {
        let mut config = valid_config();
        config.retry.max_attempts = 0;
        assert_eq!(field_of(validate_config(&config).unwrap_err()), "retry.maxAttempts");

        let mut config = valid_config();
        config.retry.backoff_multiplier = f64::NAN;
        assert_eq!(
            field_of(validate_config(&config).unwrap_err()),
            "retry.backoffMultiplier"
        );

        let mut config = valid_config();
        config.retry.max_delay_ms = 10;
        assert_eq!(field_of(validate_config(&config).unwrap_err()), "retry.maxDelayMs");
    }
}

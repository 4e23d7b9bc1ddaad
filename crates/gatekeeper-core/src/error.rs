//! Error types for Gatekeeper
//!
//! Every failure that crosses a module boundary is a [`PublishError`] tagged
//! with exactly one [`ErrorKind`]. The kind is what the retry policy and the
//! CLI inspect; the message and context are for humans and error reports.

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Result type alias using PublishError
pub type Result<T> = std::result::Result<T, PublishError>;

/// Closed set of error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input: manifest, config, arguments, missing files
    Validation,
    /// The store answered with an error response
    Api,
    /// The request never got a usable answer
    Network,
    /// Credentials were rejected or could not be obtained
    Authentication,
    /// The store rate limited us
    QuotaExceeded,
    /// Building the upload artifact failed
    Packaging,
    /// Raw error from a source that does not classify its failures
    Unknown,
}

impl ErrorKind {
    /// All kinds, in declaration order
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::Validation,
        ErrorKind::Api,
        ErrorKind::Network,
        ErrorKind::Authentication,
        ErrorKind::QuotaExceeded,
        ErrorKind::Packaging,
        ErrorKind::Unknown,
    ];

    /// Legacy error type name used in reports and issue titles
    pub fn type_name(self) -> &'static str {
        match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Api => "APIError",
            ErrorKind::Network => "NetworkError",
            ErrorKind::Authentication => "AuthenticationError",
            ErrorKind::QuotaExceeded => "QuotaExceededError",
            ErrorKind::Packaging => "PackagingError",
            ErrorKind::Unknown => "Error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Api => write!(f, "api"),
            ErrorKind::Network => write!(f, "network"),
            ErrorKind::Authentication => write!(f, "authentication"),
            ErrorKind::QuotaExceeded => write!(f, "quota_exceeded"),
            ErrorKind::Packaging => write!(f, "packaging"),
            ErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// A classified publishing failure
///
/// The kind is fixed at construction. Context is an open diagnostic map
/// (HTTP status, response body, tool output, ...).
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{message}")]
pub struct PublishError {
    kind: ErrorKind,
    message: String,
    context: Map<String, Value>,
    timestamp: DateTime<Utc>,
}

impl PublishError {
    /// Create an error of the given kind
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Api, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::QuotaExceeded, message)
    }

    pub fn packaging(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Packaging, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// Generic error surfaced when a cancellation carries no reason
    pub fn aborted() -> Self {
        Self::unknown("Retry aborted").with_context("aborted", true)
    }

    /// Generic error surfaced when a retry loop ends without any recorded error
    pub fn exhausted() -> Self {
        Self::unknown("Retry attempts exhausted")
    }

    /// Attach a context entry
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Attach an HTTP status code
    pub fn with_status(self, status: u16) -> Self {
        self.with_context("status", status)
    }

    /// Attach an OS-level error code such as `ECONNRESET`
    pub fn with_code(self, code: impl Into<String>) -> Self {
        self.with_context("code", code.into())
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Creation time as an ISO-8601 string
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Legacy type name of this error's kind
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// HTTP status code recorded in the context, if any
    pub fn status(&self) -> Option<u16> {
        self.context
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
    }

    /// OS-level error code recorded in the context, if any
    pub fn network_code(&self) -> Option<&str> {
        self.context.get("code").and_then(Value::as_str)
    }

    /// Whether this error was produced by a cancellation without a reason
    pub fn is_aborted(&self) -> bool {
        self.context.get("aborted").and_then(Value::as_bool) == Some(true)
    }
}

impl From<ConfigError> for PublishError {
    fn from(err: ConfigError) -> Self {
        let error = PublishError::validation(err.to_string());
        match &err {
            ConfigError::InvalidValue { field, .. } => error.with_context("field", field.clone()),
            ConfigError::MissingField(field) => error.with_context("field", field.clone()),
            ConfigError::NotFound(path) => {
                error.with_context("path", path.display().to_string())
            }
            _ => error,
        }
    }
}

impl From<std::io::Error> for PublishError {
    fn from(err: std::io::Error) -> Self {
        let code = match err.kind() {
            std::io::ErrorKind::ConnectionReset => Some("ECONNRESET"),
            std::io::ErrorKind::TimedOut => Some("ETIMEDOUT"),
            std::io::ErrorKind::BrokenPipe => Some("EPIPE"),
            std::io::ErrorKind::ConnectionRefused => Some("ECONNREFUSED"),
            std::io::ErrorKind::NotFound => Some("ENOENT"),
            std::io::ErrorKind::PermissionDenied => Some("EACCES"),
            _ => None,
        };

        let error = PublishError::unknown(err.to_string());
        match code {
            Some(code) => error.with_code(code),
            None => error,
        }
    }
}

impl From<zip::result::ZipError> for PublishError {
    fn from(err: zip::result::ZipError) -> Self {
        PublishError::packaging(err.to_string())
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration not found at {0}")]
    NotFound(PathBuf),

    /// Failed to parse configuration
    #[error("Unable to parse configuration at {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// Missing required field
    #[error("Missing required configuration field: {0}")]
    MissingField(String),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Shorthand for an invalid value error
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_captures_message_context_and_timestamp() {
        let error = PublishError::validation("Failed").with_context("step", "validate");

        assert_eq!(error.kind(), ErrorKind::Validation);
        assert_eq!(error.message(), "Failed");
        assert_eq!(error.to_string(), "Failed");
        assert_eq!(error.context().get("step"), Some(&json!("validate")));
        assert!(DateTime::parse_from_rfc3339(&error.timestamp_iso()).is_ok());
    }

    #[test]
    fn test_type_names() {
        let names: Vec<_> = ErrorKind::ALL.iter().map(|k| k.type_name()).collect();
        assert_eq!(
            names,
            vec![
                "ValidationError",
                "APIError",
                "NetworkError",
                "AuthenticationError",
                "QuotaExceededError",
                "PackagingError",
                "Error",
            ]
        );
    }

    #[test]
    fn test_kind_constructors() {
        assert_eq!(PublishError::api("x").kind(), ErrorKind::Api);
        assert_eq!(PublishError::network("x").kind(), ErrorKind::Network);
        assert_eq!(PublishError::authentication("x").kind(), ErrorKind::Authentication);
        assert_eq!(PublishError::quota_exceeded("x").kind(), ErrorKind::QuotaExceeded);
        assert_eq!(PublishError::packaging("x").kind(), ErrorKind::Packaging);
        assert_eq!(PublishError::unknown("x").kind(), ErrorKind::Unknown);
    }

    #[test]
    fn test_status_and_code() {
        let error = PublishError::api("server error").with_status(503);
        assert_eq!(error.status(), Some(503));
        assert_eq!(error.network_code(), None);

        let error = PublishError::unknown("reset").with_code("ECONNRESET");
        assert_eq!(error.status(), None);
        assert_eq!(error.network_code(), Some("ECONNRESET"));
    }

    #[test]
    fn test_clone_is_equal() {
        let error = PublishError::quota_exceeded("quota").with_status(429);
        assert_eq!(error.clone(), error);
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let error: PublishError = io.into();
        assert_eq!(error.kind(), ErrorKind::Unknown);
        assert_eq!(error.network_code(), Some("ECONNRESET"));

        let io = std::io::Error::new(std::io::ErrorKind::Other, "odd");
        let error: PublishError = io.into();
        assert_eq!(error.network_code(), None);
    }

    #[test]
    fn test_config_error_conversion() {
        let error: PublishError = ConfigError::invalid("repo", "bad format").into();
        assert_eq!(error.kind(), ErrorKind::Validation);
        assert_eq!(error.context().get("field"), Some(&json!("repo")));
        assert!(error.message().contains("bad format"));
    }

    #[test]
    fn test_aborted_marker() {
        assert!(PublishError::aborted().is_aborted());
        assert!(!PublishError::exhausted().is_aborted());
    }
}

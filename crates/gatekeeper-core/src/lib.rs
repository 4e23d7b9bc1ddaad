//! Gatekeeper Core - shared foundations for browser-extension publishing
//!
//! This crate provides the error taxonomy, the retry policy used by every
//! store client, cooperative cancellation, secret redaction, configuration
//! loading and validation, and publish metrics.

pub mod cancel;
pub mod config;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod sanitize;

pub use cancel::CancelToken;
pub use config::{Config, Credentials, StoreKind};
pub use error::{ConfigError, ErrorKind, PublishError, Result};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use retry::{Attempt, RetryConfig, RetryEvent, RetryOptions, RetryPolicy};
pub use sanitize::{redact, redact_value};

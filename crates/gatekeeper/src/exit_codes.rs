//! Exit codes for the CLI

use gatekeeper_core::{ConfigError, ErrorKind, PublishError};

/// Success
pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Configuration error
pub const CONFIG_ERROR: i32 = 2;

/// Validation error
pub const VALIDATION_ERROR: i32 = 5;

/// User cancelled
pub const CANCELLED: i32 = 130;

/// Exit code for an error that reached `main`
pub fn for_error(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<ConfigError>().is_some() {
        return CONFIG_ERROR;
    }

    match error.downcast_ref::<PublishError>() {
        Some(e) if e.is_aborted() => CANCELLED,
        Some(e) if e.kind() == ErrorKind::Validation => VALIDATION_ERROR,
        _ => ERROR,
    }
}

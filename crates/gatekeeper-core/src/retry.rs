//! Retry policy with deterministic exponential backoff
//!
//! [`RetryPolicy`] drives a caller-supplied operation until it succeeds, hits a
//! non-retryable error, runs out of attempts, or is cancelled.
//!
//! The delay before retrying after attempt `n` is
//! `initial_delay × backoff_multiplier^(n − 1)`, clamped into
//! `[0, max_delay]`. There is no jitter, so the sequence is exact:
//!
//! ```
//! use std::time::Duration;
//! use gatekeeper_core::{RetryConfig, RetryOptions, RetryPolicy};
//!
//! let policy = RetryPolicy::new(RetryConfig {
//!     initial_delay: Duration::from_millis(100),
//!     backoff_multiplier: 3.0,
//!     max_delay: Duration::from_millis(5000),
//!     ..Default::default()
//! });
//! let options = RetryOptions::default();
//!
//! assert_eq!(policy.calculate_delay(1, &options), Duration::from_millis(100));
//! assert_eq!(policy.calculate_delay(3, &options), Duration::from_millis(900));
//! assert_eq!(policy.calculate_delay(5, &options), Duration::from_millis(5000));
//! ```
//!
//! The policy holds only read-only configuration. Attempt counters and timers
//! are local to each `execute` call, so one policy can serve concurrent calls.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::{ErrorKind, PublishError, Result};
use crate::sanitize::redact;

/// OS-level error codes treated as transient for unclassified errors
const TRANSIENT_NETWORK_CODES: [&str; 5] = ["ECONNRESET", "ETIMEDOUT", "EAI_AGAIN", "ENOTFOUND", "EPIPE"];

/// Message prefix of a failed transport call on unclassified errors
static TRANSPORT_SIGNATURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(fetch failed|network error)\b").expect("Invalid regex"));

/// Retry configuration, fixed at policy construction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one (at least 1)
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Upper bound for any computed delay
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
        }
    }
}

/// Context handed to the operation on each invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// 1-based attempt number
    pub number: u32,
}

/// Passed to the `on_retry` hook before each backoff wait
#[derive(Debug, Clone)]
pub struct RetryEvent {
    /// The attempt that just failed
    pub attempt: u32,
    /// The wait that is about to start
    pub delay: Duration,
    /// The error the attempt failed with
    pub error: PublishError,
}

type ShouldRetryFn = dyn Fn(&PublishError) -> bool + Send + Sync;
type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type OnRetryFn = dyn Fn(RetryEvent) -> HookFuture + Send + Sync;

/// Per-call overrides and hooks for [`RetryPolicy::execute`]
#[derive(Clone, Default)]
pub struct RetryOptions {
    max_attempts: Option<u32>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    backoff_multiplier: Option<f64>,
    should_retry: Option<Arc<ShouldRetryFn>>,
    cancel: Option<CancelToken>,
    on_retry: Option<Arc<OnRetryFn>>,
}

impl std::fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryOptions")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("should_retry", &self.should_retry.as_ref().map(|_| "<predicate>"))
            .field("cancel", &self.cancel)
            .field("on_retry", &self.on_retry.as_ref().map(|_| "<hook>"))
            .finish()
    }
}

impl RetryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = Some(multiplier);
        self
    }

    /// Replace the default retry classification entirely
    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&PublishError) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    /// Observe this token before each attempt and during each wait
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Hook awaited before every backoff wait
    pub fn on_retry<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(RetryEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_retry = Some(Arc::new(move |event| Box::pin(hook(event)) as HookFuture));
        self
    }
}

/// Executes operations with exponential backoff between failed attempts
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy; `max_attempts` below 1 is raised to 1
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config: RetryConfig {
                max_attempts: config.max_attempts.max(1),
                ..config
            },
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` until success, a terminal error, exhaustion, or cancellation
    ///
    /// Fails with the last operation error verbatim, or with the cancellation
    /// reason when the token is observed as cancelled.
    pub async fn execute<T, Op, Fut>(&self, mut operation: Op, options: &RetryOptions) -> Result<T>
    where
        Op: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = options
            .max_attempts
            .unwrap_or(self.config.max_attempts)
            .max(1);
        let mut last_error: Option<PublishError> = None;

        for attempt in 1..=max_attempts {
            if let Some(token) = &options.cancel {
                if token.is_cancelled() {
                    debug!(attempt, "cancelled before attempt");
                    return Err(token.abort_error());
                }
            }

            debug!(attempt, max_attempts, "starting attempt");

            let error = match operation(Attempt { number: attempt }).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if attempt == max_attempts || !self.should_retry(&error, options) {
                debug!(
                    attempt,
                    kind = %error.kind(),
                    error = %redact(error.message()),
                    "giving up"
                );
                return Err(error);
            }

            let delay = self.calculate_delay(attempt, options);
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                kind = %error.kind(),
                error = %redact(error.message()),
                "attempt failed, retrying"
            );

            if let Some(hook) = &options.on_retry {
                hook(RetryEvent {
                    attempt,
                    delay,
                    error: error.clone(),
                })
                .await;
            }

            last_error = Some(error);
            wait(delay, options.cancel.as_ref()).await?;
        }

        Err(last_error.unwrap_or_else(PublishError::exhausted))
    }

    /// Whether `error` should be retried under these options
    ///
    /// A caller predicate in `options` replaces the default classification.
    pub fn should_retry(&self, error: &PublishError, options: &RetryOptions) -> bool {
        match &options.should_retry {
            Some(predicate) => predicate(error),
            None => is_retryable(error),
        }
    }

    /// Backoff delay to wait after the given (1-based) attempt fails
    pub fn calculate_delay(&self, attempt: u32, options: &RetryOptions) -> Duration {
        let initial = options.initial_delay.unwrap_or(self.config.initial_delay);
        let multiplier = options
            .backoff_multiplier
            .unwrap_or(self.config.backoff_multiplier);
        let max = options.max_delay.unwrap_or(self.config.max_delay);

        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let max_ms = max.as_millis() as f64;
        let raw_ms = initial.as_millis() as f64 * multiplier.powi(exponent);

        let clamped_ms = if raw_ms.is_nan() {
            max_ms
        } else {
            raw_ms.clamp(0.0, max_ms)
        };

        Duration::from_millis(clamped_ms.round() as u64)
    }
}

/// Default retry classification
///
/// Validation and Authentication errors need someone to act, so they are
/// terminal. Quota and Network errors are transient. API errors are retried
/// only for 429 and 5xx. Packaging and Unknown errors fall back to status
/// codes, then OS network codes, then the transport failure prefix.
pub fn is_retryable(error: &PublishError) -> bool {
    match error.kind() {
        ErrorKind::Validation | ErrorKind::Authentication => false,
        ErrorKind::QuotaExceeded | ErrorKind::Network => true,
        ErrorKind::Api => error.status().is_some_and(is_retryable_status),
        ErrorKind::Packaging | ErrorKind::Unknown => unclassified_is_retryable(error),
    }
}

fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

fn unclassified_is_retryable(error: &PublishError) -> bool {
    if let Some(status) = error.status() {
        if is_retryable_status(status) {
            return true;
        }
        if (400..500).contains(&status) {
            return false;
        }
    }

    if error
        .network_code()
        .is_some_and(|code| TRANSIENT_NETWORK_CODES.contains(&code))
    {
        return true;
    }

    TRANSPORT_SIGNATURE.is_match(error.message())
}

/// Sleep for `delay`, failing early with the token's reason if it is cancelled
async fn wait(delay: Duration, cancel: Option<&CancelToken>) -> Result<()> {
    if delay.is_zero() {
        return Ok(());
    }

    let Some(token) = cancel else {
        tokio::time::sleep(delay).await;
        return Ok(());
    };

    tokio::select! {
        biased;
        _ = token.cancelled() => {
            debug!(delay_ms = delay.as_millis() as u64, "backoff wait cancelled");
            Err(token.abort_error())
        }
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

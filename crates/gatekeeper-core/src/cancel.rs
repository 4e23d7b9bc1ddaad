//! Cooperative cancellation
//!
//! [`CancelToken`] wraps a tokio-util `CancellationToken` and remembers why it
//! was cancelled, so whoever observes the cancellation can surface the
//! caller's reason verbatim.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::PublishError;

/// Externally owned abort signal with an optional reason
///
/// Clones share state. The first cancellation wins; later calls are no-ops.
#[derive(Debug, Clone)]
pub struct CancelToken {
    token: CancellationToken,
    reason: Arc<Mutex<Option<PublishError>>>,
}

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reason: Arc::new(Mutex::new(None)),
        }
    }

    /// Cancel without a reason
    pub fn cancel(&self) {
        debug!("cancellation requested");
        self.token.cancel();
    }

    /// Cancel with a reason that observers will surface as their error
    pub fn cancel_with(&self, reason: PublishError) {
        if self.token.is_cancelled() {
            return;
        }

        {
            let mut slot = self.lock_reason();
            if slot.is_none() {
                *slot = Some(reason);
            }
        }

        debug!("cancellation requested with reason");
        self.token.cancel();
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The reason given at cancellation, if any
    pub fn reason(&self) -> Option<PublishError> {
        self.lock_reason().clone()
    }

    /// The error an observer should fail with: the reason, or a generic abort error
    pub fn abort_error(&self) -> PublishError {
        self.reason().unwrap_or_else(PublishError::aborted)
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    fn lock_reason(&self) -> MutexGuard<'_, Option<PublishError>> {
        self.reason.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

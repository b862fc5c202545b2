#![forbid(unsafe_code)]

use thiserror::Error;

/// Error carried by a cancelled [`CancelToken`](crate::CancelToken).
///
/// Cancellation is never a failure of the cancelled operation: callers match on
/// it to tell "stopped on request" apart from real errors.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("operation cancelled: {reason}")]
pub struct CancellationError {
    reason: String,
}

impl CancellationError {
    pub fn new<S: Into<String>>(reason: S) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Human-readable reason given to [`CancelToken::cancel_with`](crate::CancelToken::cancel_with).
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl Default for CancellationError {
    fn default() -> Self {
        Self::new("cancelled")
    }
}

//! Errors surfaced by `CircuitBreaker::invoke`.

use std::time::Duration;
use thiserror::Error;

/// Outcome of a call the breaker did not complete successfully.
///
/// `E` is the protected operation's own error type and is passed through
/// unchanged.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The protected operation failed.
    #[error("{0}")]
    Operation(E),

    /// The operation did not complete within the call timeout.
    #[error("call timed out after {0:?}")]
    CallTimeout(Duration),

    /// The breaker rejected the call without running it.
    #[error("circuit breaker is open")]
    Open,
}

impl<E> BreakerError<E> {
    /// True if the call was rejected without being attempted.
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open)
    }

    /// True if the call exceeded the call timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BreakerError::CallTimeout(_))
    }

    /// The operation's own error, if that is what this is.
    pub fn into_operation(self) -> Option<E> {
        match self {
            BreakerError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

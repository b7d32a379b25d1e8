//! Error kinds produced by the async toolkit.
//!
//! Every toolkit function that runs caller-supplied work is generic over the
//! caller's error type `E`. The caller's own failures travel through
//! untouched (as [`AsyncError::Failed`], or inside `RetryExhausted` /
//! `AllFailed`), so the root cause is never lost.

use std::time::Duration;

use thiserror::Error;

/// An operation was cancelled through an [`AbortSignal`](super::AbortSignal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Error)]
#[error("operation aborted")]
pub struct AbortError;

/// A timer won the race against the awaited operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TimeoutError {
    /// The configured limit.
    pub timeout: Duration,
    pub message: String,
}

impl TimeoutError {
    pub fn new(timeout: Duration, message: Option<String>) -> Self {
        let message = message
            .unwrap_or_else(|| format!("operation timed out after {}ms", timeout.as_millis()));
        Self { timeout, message }
    }
}

/// Message carried by a superseded debounced call.
pub const DEBOUNCE_CANCELLED: &str = "Debounced call cancelled";

/// Message carried by a superseded or refused throttled call.
pub const THROTTLE_CANCELLED: &str = "Throttled call cancelled";

/// Failure of a toolkit operation wrapping work that fails with `E`.
#[derive(Debug, Error)]
pub enum AsyncError<E> {
    /// Malformed input, reported before any work starts.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Aborted(#[from] AbortError),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// Every attempt failed. Holds the error from the final attempt.
    #[error("operation failed after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: E },

    /// Every candidate failed. Errors are in input order.
    #[error("all {} operations failed", errors.len())]
    AllFailed { errors: Vec<E> },

    /// A debounced or throttled call was superseded or refused.
    #[error("{0}")]
    Cancelled(String),

    /// The wrapped operation's own error.
    #[error("{0}")]
    Failed(E),
}

impl<E> AsyncError<E> {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// The caller's error, if this failure came from the wrapped work itself.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Failed(error) => Some(error),
            Self::RetryExhausted { last_error, .. } => Some(last_error),
            _ => None,
        }
    }

    /// Convert the caller's error type, keeping the failure kind.
    pub fn map_err<F, U>(self, f: F) -> AsyncError<U>
    where
        F: Fn(E) -> U,
    {
        match self {
            Self::InvalidArgument(message) => AsyncError::InvalidArgument(message),
            Self::Aborted(error) => AsyncError::Aborted(error),
            Self::Timeout(error) => AsyncError::Timeout(error),
            Self::RetryExhausted {
                attempts,
                last_error,
            } => AsyncError::RetryExhausted {
                attempts,
                last_error: f(last_error),
            },
            Self::AllFailed { errors } => AsyncError::AllFailed {
                errors: errors.into_iter().map(f).collect(),
            },
            Self::Cancelled(message) => AsyncError::Cancelled(message),
            Self::Failed(error) => AsyncError::Failed(f(error)),
        }
    }
}

//! Error types shared by the request cache and its callers.

use std::sync::Arc;

use thiserror::Error;

/// Programmer error: a cache key that cannot address the cache.
///
/// Returned synchronously by `fetch`, `invalidate` and `refresh` before any
/// cache state is read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidKeyError {
    /// The key has neither a prefix nor any parts.
    #[error("cache key is empty")]
    Empty,
    /// A key part at the given position has an empty name.
    #[error("cache key part #{position} has an empty name")]
    UnnamedPart {
        /// Zero-based index of the offending part.
        position: usize,
    },
}

/// Terminal outcome of a fetch that did not produce a payload.
///
/// `FetchError` is cheap to clone: the producer error is shared behind an
/// [`Arc`], so every observer of one in-flight request receives the very
/// same error object.
#[derive(Debug, Error)]
pub enum FetchError<E> {
    /// The producer failed on every attempt.
    #[error("producer failed after {attempts} attempt(s): {error}")]
    Producer {
        /// The error returned by the last attempt.
        error: Arc<E>,
        /// How many times the producer was invoked.
        attempts: u32,
    },
    /// The request was cancelled before it settled.
    #[error("request was cancelled")]
    Cancelled,
    /// The task driving the request went away without settling it
    /// (background task timeout or runtime shutdown).
    #[error("request was detached before it settled")]
    Detached,
}

impl<E> Clone for FetchError<E> {
    fn clone(&self) -> Self {
        match self {
            FetchError::Producer { error, attempts } => FetchError::Producer {
                error: Arc::clone(error),
                attempts: *attempts,
            },
            FetchError::Cancelled => FetchError::Cancelled,
            FetchError::Detached => FetchError::Detached,
        }
    }
}

impl<E> FetchError<E> {
    /// Returns the producer error, if this is a producer failure.
    pub fn producer_error(&self) -> Option<&Arc<E>> {
        match self {
            FetchError::Producer { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Returns `true` for [`FetchError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

/// Invalid [`FetchOptions`](crate::FetchOptions) value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    /// Backoff base must be a positive duration.
    #[error("backoff base must be greater than zero")]
    ZeroBackoff,
}

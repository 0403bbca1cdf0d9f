//! Error types for lock operations.

use thiserror::Error;

use crate::timeout::TimeoutValue;

/// Errors that can occur while acquiring, holding or releasing a lock.
///
/// Business logic failures are never wrapped in this type: the facade hands
/// them back to the caller verbatim.
#[derive(Error, Debug)]
pub enum LockError {
    /// No backend handle was supplied for the requested lock flavor.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Lock acquisition did not succeed within the timeout.
    #[error("lock acquisition timed out after {0}")]
    Timeout(TimeoutValue),

    /// Lock operation was cancelled by the caller.
    #[error("lock operation was cancelled")]
    Cancelled,

    /// A backend (file system, store node) could not be reached.
    #[error("backend '{backend}' unavailable: {source}")]
    BackendUnavailable {
        backend: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Release was attempted but not confirmed by the backend.
    #[error("failed to release lock '{key}': {reason}")]
    ReleaseFailure { key: String, reason: String },

    /// Invalid lock key.
    #[error("invalid lock key: {0}")]
    InvalidKey(String),

    /// Timeout seconds that cannot be interpreted (NaN).
    #[error("invalid timeout: {0}")]
    InvalidTimeout(f64),
}

impl LockError {
    /// Wraps any error as [`LockError::BackendUnavailable`] for `backend`.
    pub fn unavailable(
        backend: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            source: source.into(),
        }
    }

    /// Returns `true` for errors that mean acquisition ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

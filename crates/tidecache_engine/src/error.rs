//! Error types for the synchronization engine.

use thiserror::Error;
use tidecache_storage::StorageError;

/// Result type for source fetches.
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors reported by a remote data source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the request can be retried.
        retryable: bool,
    },

    /// The response could not be decoded into models.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// The server rejected the request.
    #[error("server error: {0}")]
    Server(String),

    /// Timeout.
    #[error("request timed out")]
    Timeout,

    /// The fetch was cancelled by the source.
    #[error("fetch cancelled")]
    Cancelled,
}

impl SourceError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if issuing the same fetch again may succeed.
    ///
    /// The engine never retries on its own; this is a hint for callers
    /// deciding whether to call `refresh()` again.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Transport { retryable, .. } => *retryable,
            SourceError::Timeout => true,
            SourceError::Server(_) => true,
            _ => false,
        }
    }
}

/// Errors surfaced by a data provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The remote fetch failed.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// The local cache could not be read or written.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// An operation completed with neither a value nor an error.
    #[error("invariant violated: {0}")]
    Undefined(String),
}

impl ProviderError {
    /// Returns true if this is a source failure.
    pub fn is_source(&self) -> bool {
        matches!(self, ProviderError::Source(_))
    }

    /// Returns true if this is a storage failure.
    pub fn is_storage(&self) -> bool {
        matches!(self, ProviderError::Storage(_))
    }
}

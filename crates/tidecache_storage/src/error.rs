//! Error types for repository operations.

use std::io;
use thiserror::Error;

/// Result type for repository operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while reading or writing the local cache.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The persisted snapshot could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The persisted snapshot is structurally invalid.
    #[error("cache corrupted: {0}")]
    Corrupted(String),

    /// Another process holds the cache lock.
    #[error("cache locked: another process has exclusive access")]
    Locked,

    /// A backend-specific failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Creates a backend error from any displayable message.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

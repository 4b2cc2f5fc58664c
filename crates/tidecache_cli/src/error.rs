//! CLI error type.

use thiserror::Error;
use tidecache_engine::ProviderError;
use tidecache_storage::StorageError;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The cache could not be opened, read or written.
    #[error("cache error: {0}")]
    Storage(#[from] StorageError),

    /// A reconciliation or provider read failed.
    #[error("sync failed: {0}")]
    Provider(#[from] ProviderError),

    /// A reconciliation failure delivered to the command's observer.
    #[error("sync failed: {0}")]
    Sync(String),

    /// No record with the given id is cached.
    #[error("no cached record with id {0:?}")]
    NotFound(String),

    /// Output could not be rendered.
    #[error("output error: {0}")]
    Json(#[from] serde_json::Error),

    /// An unsupported `--format` value.
    #[error("unknown output format {0:?}, expected text or json")]
    Format(String),
}

//! Clear command implementation.

use crate::error::CliResult;
use crate::record::open_cache;
use std::path::Path;
use tidecache_storage::Repository;
use tracing::info;

/// Removes every cached record. Returns how many were removed.
pub async fn run(cache: &Path) -> CliResult<usize> {
    let repository = open_cache(cache)?;
    let removed = repository.len();
    repository.delete_all().await?;

    info!(path = %cache.display(), removed, "cache cleared");
    println!("Cleared {removed} record(s)");
    Ok(removed)
}

//! List command implementation.

use super::{print_json, OutputFormat};
use crate::error::CliResult;
use crate::record::{open_cache, Record};
use std::path::Path;
use tidecache_storage::Repository;

/// Reads one page of cached records.
pub async fn page(
    cache: &Path,
    offset: usize,
    count: usize,
    reversed: bool,
) -> CliResult<Vec<Record>> {
    let repository = open_cache(cache)?;
    Ok(repository.fetch_page(offset, count, reversed).await?)
}

/// Runs the list command.
pub async fn run(
    cache: &Path,
    offset: usize,
    count: usize,
    reversed: bool,
    format: OutputFormat,
) -> CliResult<()> {
    let records = page(cache, offset, count, reversed).await?;

    match format {
        OutputFormat::Json => print_json(&records)?,
        OutputFormat::Text => {
            for record in &records {
                println!("{}  {}", record.id, serde_json::to_string(&record.fields)?);
            }
            if records.is_empty() {
                println!("(no records)");
            }
        }
    }

    Ok(())
}

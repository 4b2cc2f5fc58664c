//! Get command implementation.

use super::{print_json, OutputFormat};
use crate::error::{CliError, CliResult};
use crate::record::open_cache;
use std::path::Path;
use tidecache_storage::Repository;

/// Runs the get command.
pub async fn run(cache: &Path, id: &str, format: OutputFormat) -> CliResult<()> {
    let repository = open_cache(cache)?;
    let record = repository
        .fetch_one(id)
        .await?
        .ok_or_else(|| CliError::NotFound(id.to_owned()))?;

    match format {
        OutputFormat::Json => print_json(&record)?,
        OutputFormat::Text => {
            println!("id: {}", record.id);
            for (field, value) in &record.fields {
                println!("{field}: {value}");
            }
        }
    }

    Ok(())
}

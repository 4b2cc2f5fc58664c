//! Generic JSON records and the fixture-file source.

use crate::error::{CliError, CliResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tidecache_engine::{DataSource, SourceError, SourceResult};
use tidecache_storage::{FileRepository, Identifiable};

/// A JSON object identified by its `"id"` field.
///
/// Every other field is kept as-is and takes part in change detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// The record identifier.
    pub id: String,
    /// Remaining fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Identifiable for Record {
    fn identifier(&self) -> &str {
        &self.id
    }
}

/// Opens the record cache at `path`.
pub fn open_cache(path: &Path) -> CliResult<FileRepository<Record>> {
    FileRepository::open_with_create_dirs(path).map_err(CliError::from)
}

/// A source that reads a JSON array of records from a file on each fetch.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    /// Creates a source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DataSource<Record> for JsonFileSource {
    async fn fetch(&self) -> SourceResult<Vec<Record>> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            SourceError::transport_fatal(format!("cannot read {}: {e}", self.path.display()))
        })?;

        serde_json::from_slice(&bytes).map_err(|e| SourceError::Decoding(e.to_string()))
    }
}

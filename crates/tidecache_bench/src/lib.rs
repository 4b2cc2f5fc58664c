//! Benchmark utilities.

#![warn(missing_docs)]

use rand::Rng;
use serde::{Deserialize, Serialize};
use tidecache_storage::Identifiable;

/// A small model used by every benchmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Identifier.
    pub id: String,
    /// Payload that changes on update.
    pub value: u64,
    /// Fixed-size text payload.
    pub label: String,
}

impl Identifiable for Row {
    fn identifier(&self) -> &str {
        &self.id
    }
}

/// Generates `count` rows with ids `row-0`, `row-1`, ...
pub fn generate_rows(count: usize) -> Vec<Row> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| Row {
            id: format!("row-{i}"),
            value: rng.gen(),
            label: "x".repeat(32),
        })
        .collect()
}

/// Returns a copy of `rows` where every `every`-th row has a new value.
pub fn with_updates(rows: &[Row], every: usize) -> Vec<Row> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let mut row = row.clone();
            if i % every == 0 {
                row.value = row.value.wrapping_add(1);
            }
            row
        })
        .collect()
}

/// Generates `count` rows whose ids share nothing with [`generate_rows`].
pub fn replacement_rows(count: usize) -> Vec<Row> {
    generate_rows(count)
        .into_iter()
        .map(|row| Row {
            id: format!("new-{}", row.id),
            ..row
        })
        .collect()
}

/// Builds a single-threaded runtime for driving async repository calls.
pub fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

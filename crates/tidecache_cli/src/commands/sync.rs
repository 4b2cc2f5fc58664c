//! Sync command implementation.

use super::{print_json, OutputFormat};
use crate::error::{CliError, CliResult};
use crate::record::{open_cache, JsonFileSource, Record};
use std::path::Path;
use std::sync::Arc;
use tidecache_engine::{
    Change, ChangeSummary, DataProvider, Immediate, Observer, ObserverId, ObserverOptions,
    ProviderConfig, ProviderError, TriggerPolicy,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::info;

enum Outcome {
    Changes(Vec<Change<Record>>),
    Failed(String),
}

/// Runs one reconciliation of the cache against a JSON fixture and returns
/// the resulting change batch.
pub async fn reconcile(cache: &Path, fixture: &Path) -> CliResult<Vec<Change<Record>>> {
    let repository = Arc::new(open_cache(cache)?);
    let source = Arc::new(JsonFileSource::new(fixture));
    let provider = DataProvider::with_config(
        ProviderConfig::new(TriggerPolicy::None).with_label("cli"),
        source,
        repository,
        Handle::current(),
    );

    let (sender, mut outcomes) = mpsc::unbounded_channel();
    let failures = sender.clone();
    let observer = Observer::new(
        ObserverId::next(),
        Arc::new(Immediate),
        move |changes: &[Change<Record>]| {
            let _ = sender.send(Outcome::Changes(changes.to_vec()));
        },
        move |error: &ProviderError| {
            let _ = failures.send(Outcome::Failed(error.to_string()));
        },
    )
    .with_options(ObserverOptions::new().with_always_notify_on_refresh(true));

    provider.add_observer(observer);
    provider.refresh();
    provider.flush().await;

    // The first delivery is the baseline of what was cached before.
    let _baseline = outcomes.try_recv();
    let outcome = outcomes.try_recv();
    provider.shutdown().await;

    match outcome {
        Ok(Outcome::Changes(changes)) => Ok(changes),
        Ok(Outcome::Failed(message)) => Err(CliError::Sync(message)),
        Err(_) => Err(ProviderError::Undefined(
            "reconciliation finished without a result".into(),
        )
        .into()),
    }
}

/// Runs the sync command.
pub async fn run(cache: &Path, fixture: &Path, format: OutputFormat) -> CliResult<()> {
    let changes = reconcile(cache, fixture).await?;
    let summary = ChangeSummary::of(&changes);
    info!(
        inserts = summary.inserts,
        updates = summary.updates,
        deletes = summary.deletes,
        "cache synchronized"
    );

    match format {
        OutputFormat::Json => print_json(&changes)?,
        OutputFormat::Text => {
            for change in &changes {
                let kind = match change {
                    Change::Insert(_) => "insert",
                    Change::Update(_) => "update",
                    Change::Delete(_) => "delete",
                };
                println!("{kind:<6}  {}", change.identifier());
            }
            println!(
                "{} inserted, {} updated, {} deleted",
                summary.inserts, summary.updates, summary.deletes
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn sync_reports_changes_between_runs() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("records.cache");
        let fixture = dir.path().join("fixture.json");

        fs::write(&fixture, r#"[{"id": "a", "v": 1}, {"id": "b", "v": 1}]"#).unwrap();
        let first = reconcile(&cache, &fixture).await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(Change::is_insert));

        fs::write(&fixture, r#"[{"id": "a", "v": 2}, {"id": "c", "v": 1}]"#).unwrap();
        let second = reconcile(&cache, &fixture).await.unwrap();
        let summary = ChangeSummary::of(&second);
        assert_eq!((summary.inserts, summary.updates, summary.deletes), (1, 1, 1));

        let third = reconcile(&cache, &fixture).await.unwrap();
        assert!(third.is_empty());
    }

    #[tokio::test]
    async fn sync_surfaces_source_failure() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("records.cache");
        let fixture = dir.path().join("missing.json");

        let result = reconcile(&cache, &fixture).await;
        assert!(matches!(result, Err(CliError::Sync(_))));
    }
}

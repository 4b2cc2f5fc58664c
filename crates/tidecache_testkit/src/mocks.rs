//! Scriptable collaborators for provider tests.

use crate::DEFAULT_WAIT;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tidecache_engine::{DataSource, SourceError, SourceResult};
use tidecache_storage::{Identifiable, Repository, StorageError, StorageResult};
use tokio::sync::watch;

/// A source returning a scripted response.
///
/// Fetches can be held at a gate to keep a reconciliation in flight while a
/// test issues more triggers.
///
/// ```rust,ignore
/// let source = MockSource::new(projects(2));
/// source.hold();
/// provider.refresh();
/// source.wait_for_fetches(1).await; // fetch started, now blocked
/// source.release();
/// ```
#[derive(Debug)]
pub struct MockSource<M> {
    response: Mutex<SourceResult<Vec<M>>>,
    fetches: watch::Sender<usize>,
    gate: watch::Sender<bool>,
}

impl<M: Identifiable> MockSource<M> {
    /// Creates a source returning `models`.
    pub fn new(models: Vec<M>) -> Self {
        Self {
            response: Mutex::new(Ok(models)),
            fetches: watch::Sender::new(0),
            gate: watch::Sender::new(true),
        }
    }

    /// Creates a source returning an empty collection.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Makes subsequent fetches return `models`.
    pub fn set_models(&self, models: Vec<M>) {
        *self.response.lock() = Ok(models);
    }

    /// Makes subsequent fetches fail with `error`.
    pub fn fail_with(&self, error: SourceError) {
        *self.response.lock() = Err(error);
    }

    /// Number of fetches started so far.
    pub fn fetch_count(&self) -> usize {
        *self.fetches.borrow()
    }

    /// Blocks fetches after they have been counted.
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    /// Lets blocked and future fetches through.
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Waits until at least `count` fetches have started.
    ///
    /// # Panics
    ///
    /// Panics if that does not happen within [`DEFAULT_WAIT`].
    pub async fn wait_for_fetches(&self, count: usize) {
        let mut fetches = self.fetches.subscribe();
        tokio::time::timeout(DEFAULT_WAIT, fetches.wait_for(|started| *started >= count))
            .await
            .expect("Timed out waiting for fetches")
            .expect("Fetch counter closed");
    }
}

#[async_trait]
impl<M: Identifiable> DataSource<M> for MockSource<M> {
    async fn fetch(&self) -> SourceResult<Vec<M>> {
        self.fetches.send_modify(|started| *started += 1);

        let mut gate = self.gate.subscribe();
        // The sender lives in `self`, so the wait only ends once opened.
        let _ = gate.wait_for(|open| *open).await;

        self.response.lock().clone()
    }
}

/// A repository wrapper that fails a configurable number of calls.
#[derive(Debug)]
pub struct FaultyRepository<R> {
    inner: R,
    failing_saves: AtomicUsize,
    failing_reads: AtomicUsize,
}

impl<R> FaultyRepository<R> {
    /// Wraps `inner`; no call fails until configured.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            failing_saves: AtomicUsize::new(0),
            failing_reads: AtomicUsize::new(0),
        }
    }

    /// Returns the wrapped repository.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Fails the next `count` batch writes (`save` and `delete_all`).
    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    /// Fails the next `count` reads.
    pub fn fail_next_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    fn check(counter: &AtomicUsize, what: &str) -> StorageResult<()> {
        let armed = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if armed {
            Err(StorageError::backend(format!("injected {what} failure")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<M, R> Repository<M> for FaultyRepository<R>
where
    M: Identifiable,
    R: Repository<M>,
{
    async fn fetch_one(&self, id: &str) -> StorageResult<Option<M>> {
        Self::check(&self.failing_reads, "read")?;
        self.inner.fetch_one(id).await
    }

    async fn fetch_all(&self) -> StorageResult<Vec<M>> {
        Self::check(&self.failing_reads, "read")?;
        self.inner.fetch_all().await
    }

    async fn fetch_page(
        &self,
        offset: usize,
        count: usize,
        reversed: bool,
    ) -> StorageResult<Vec<M>> {
        Self::check(&self.failing_reads, "read")?;
        self.inner.fetch_page(offset, count, reversed).await
    }

    async fn save(&self, upserts: Vec<M>, deletes: Vec<String>) -> StorageResult<()> {
        Self::check(&self.failing_saves, "save")?;
        self.inner.save(upserts, deletes).await
    }

    async fn delete_all(&self) -> StorageResult<()> {
        Self::check(&self.failing_saves, "save")?;
        self.inner.delete_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{project, projects, Project};
    use std::sync::Arc;
    use tidecache_storage::InMemoryRepository;

    #[tokio::test]
    async fn mock_source_counts_and_scripts() {
        let source = MockSource::new(projects(2));
        assert_eq!(source.fetch().await.unwrap().len(), 2);

        source.fail_with(SourceError::Timeout);
        assert_eq!(source.fetch().await, Err(SourceError::Timeout));
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn mock_source_gate_blocks_until_released() {
        let source = Arc::new(MockSource::new(vec![project("a")]));
        source.hold();

        let fetching = Arc::clone(&source);
        let task = tokio::spawn(async move { fetching.fetch().await });

        source.wait_for_fetches(1).await;
        assert!(!task.is_finished());

        source.release();
        assert_eq!(task.await.unwrap().unwrap(), vec![project("a")]);
    }

    #[tokio::test]
    async fn faulty_repository_fails_then_recovers() {
        let repository = FaultyRepository::new(InMemoryRepository::<Project>::new());
        repository.fail_next_saves(1);

        let first = repository.save(vec![project("a")], vec![]).await;
        assert!(matches!(first, Err(StorageError::Backend(_))));
        assert!(repository.inner().is_empty());

        repository.save(vec![project("a")], vec![]).await.unwrap();
        assert_eq!(repository.inner().len(), 1);
    }
}

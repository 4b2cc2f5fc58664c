//! In-memory repository for tests and ephemeral caches.

use crate::entries::Entries;
use crate::error::StorageResult;
use crate::model::Identifiable;
use crate::repository::Repository;
use async_trait::async_trait;
use parking_lot::RwLock;

/// An in-memory repository.
///
/// This repository keeps all models in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Caches that don't need to survive a restart
///
/// # Ordering
///
/// The natural order is the order of the last write: a model moves to the
/// end each time it is inserted or updated.
///
/// # Thread Safety
///
/// A batch `save` runs under a single write lock, so concurrent readers see
/// either the whole batch or none of it.
///
/// # Example
///
/// ```rust
/// # use tidecache_storage::{Identifiable, InMemoryRepository};
/// #[derive(Debug, Clone, PartialEq)]
/// struct Note { id: String }
///
/// impl Identifiable for Note {
///     fn identifier(&self) -> &str { &self.id }
/// }
///
/// let repository = InMemoryRepository::with_models(vec![Note { id: "n1".into() }]);
/// assert_eq!(repository.len(), 1);
/// ```
#[derive(Debug)]
pub struct InMemoryRepository<M> {
    entries: RwLock<Entries<M>>,
}

impl<M> Default for InMemoryRepository<M> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
        }
    }
}

impl<M: Identifiable> InMemoryRepository<M> {
    /// Creates a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repository pre-populated with `models`, in that order.
    #[must_use]
    pub fn with_models(models: Vec<M>) -> Self {
        let mut entries = Entries::default();
        entries.apply(models, &[]);
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Returns a copy of all models in natural order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<M> {
        self.entries.read().all()
    }

    /// Returns the number of stored models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if no model is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl<M: Identifiable> Repository<M> for InMemoryRepository<M> {
    async fn fetch_one(&self, id: &str) -> StorageResult<Option<M>> {
        Ok(self.entries.read().get(id))
    }

    async fn fetch_all(&self) -> StorageResult<Vec<M>> {
        Ok(self.entries.read().all())
    }

    async fn fetch_page(
        &self,
        offset: usize,
        count: usize,
        reversed: bool,
    ) -> StorageResult<Vec<M>> {
        Ok(self.entries.read().page(offset, count, reversed))
    }

    async fn save(&self, upserts: Vec<M>, deletes: Vec<String>) -> StorageResult<()> {
        if upserts.is_empty() && deletes.is_empty() {
            return Ok(());
        }

        self.entries.write().apply(upserts, &deletes);
        Ok(())
    }

    async fn delete_all(&self) -> StorageResult<()> {
        self.entries.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        id: String,
        body: String,
    }

    impl Identifiable for Note {
        fn identifier(&self) -> &str {
            &self.id
        }
    }

    fn note(id: &str, body: &str) -> Note {
        Note {
            id: id.into(),
            body: body.into(),
        }
    }

    #[tokio::test]
    async fn memory_new_is_empty() {
        let repository = InMemoryRepository::<Note>::new();
        assert!(repository.is_empty());
        assert!(repository.fetch_all().await.unwrap().is_empty());
        assert_eq!(repository.fetch_one("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_save_and_fetch() {
        let repository = InMemoryRepository::new();
        repository
            .save(vec![note("a", "one"), note("b", "two")], vec![])
            .await
            .unwrap();

        assert_eq!(repository.len(), 2);
        assert_eq!(
            repository.fetch_one("b").await.unwrap(),
            Some(note("b", "two"))
        );
    }

    #[tokio::test]
    async fn memory_save_updates_and_deletes() {
        let repository = InMemoryRepository::with_models(vec![
            note("a", "one"),
            note("b", "two"),
            note("c", "three"),
        ]);

        repository
            .save(vec![note("a", "uno"), note("d", "four")], vec!["c".into()])
            .await
            .unwrap();

        let all = repository.fetch_all().await.unwrap();
        let ids: Vec<_> = all.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "d"]);
        assert_eq!(all[1].body, "uno");
    }

    #[tokio::test]
    async fn memory_empty_save_is_noop() {
        let repository = InMemoryRepository::with_models(vec![note("a", "one")]);
        repository.save(vec![], vec![]).await.unwrap();
        assert_eq!(repository.snapshot(), vec![note("a", "one")]);
    }

    #[tokio::test]
    async fn memory_fetch_page() {
        let repository = InMemoryRepository::with_models(
            (0..10).map(|i| note(&format!("n{i}"), "")).collect(),
        );

        let page = repository.fetch_page(2, 3, false).await.unwrap();
        let ids: Vec<_> = page.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["n2", "n3", "n4"]);

        let page = repository.fetch_page(0, 2, true).await.unwrap();
        let ids: Vec<_> = page.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["n9", "n8"]);

        assert!(repository.fetch_page(20, 5, false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_delete_all() {
        let repository = InMemoryRepository::with_models(vec![note("a", ""), note("b", "")]);
        repository.delete_all().await.unwrap();
        assert!(repository.is_empty());
    }
}

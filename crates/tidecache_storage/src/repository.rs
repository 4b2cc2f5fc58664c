//! Repository capability definition.

use crate::error::StorageResult;
use crate::model::Identifiable;
use async_trait::async_trait;

/// A persistent local store of domain models.
///
/// Repositories own the mapping between a model and its persisted
/// representation. The synchronization engine only sees models.
///
/// # Invariants
///
/// - `save` is atomic: readers observe the state before or after the whole
///   batch, never a partially applied one
/// - a `save` with no upserts and no deletes is always safe and performs no
///   write
/// - `fetch_page` orders by the backend's documented natural order;
///   `reversed` flips that order before the window is applied
/// - repositories must be `Send + Sync` so one instance can be shared
///   between a provider's worker and direct readers
///
/// # Implementors
///
/// - [`super::InMemoryRepository`] - For tests and ephemeral caches
/// - [`super::FileRepository`] - For caches that survive restarts
#[async_trait]
pub trait Repository<M: Identifiable>: Send + Sync {
    /// Looks up a single model by identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    async fn fetch_one(&self, id: &str) -> StorageResult<Option<M>>;

    /// Returns every model in natural order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    async fn fetch_all(&self) -> StorageResult<Vec<M>>;

    /// Returns at most `count` models starting at `offset`.
    ///
    /// The window is applied after ordering, so `fetch_page(0, n, true)`
    /// returns the `n` last models of the natural order, last one first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    async fn fetch_page(&self, offset: usize, count: usize, reversed: bool)
        -> StorageResult<Vec<M>>;

    /// Upserts `upserts` and removes `deletes` as one atomic batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch could not be persisted. On error the
    /// repository content is left as it was before the call.
    async fn save(&self, upserts: Vec<M>, deletes: Vec<String>) -> StorageResult<()>;

    /// Removes every model.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    async fn delete_all(&self) -> StorageResult<()>;
}

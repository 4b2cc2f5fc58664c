//! Change records produced by a reconciliation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tidecache_storage::Identifiable;

/// A single change between two snapshots of the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
pub enum Change<M> {
    /// A model whose identifier was not present before.
    Insert(M),
    /// A model whose identifier was present with different field values.
    Update(M),
    /// The identifier of a model that is no longer present.
    Delete(String),
}

impl<M: Identifiable> Change<M> {
    /// Returns the identifier this change is about.
    pub fn identifier(&self) -> &str {
        match self {
            Change::Insert(model) | Change::Update(model) => model.identifier(),
            Change::Delete(id) => id,
        }
    }
}

impl<M> Change<M> {
    /// Returns the new model for inserts and updates.
    pub fn item(&self) -> Option<&M> {
        match self {
            Change::Insert(model) | Change::Update(model) => Some(model),
            Change::Delete(_) => None,
        }
    }

    /// Returns true for [`Change::Insert`].
    pub fn is_insert(&self) -> bool {
        matches!(self, Change::Insert(_))
    }

    /// Returns true for [`Change::Update`].
    pub fn is_update(&self) -> bool {
        matches!(self, Change::Update(_))
    }

    /// Returns true for [`Change::Delete`].
    pub fn is_delete(&self) -> bool {
        matches!(self, Change::Delete(_))
    }
}

/// Insert, update and delete counts of a change batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    /// Number of inserts.
    pub inserts: usize,
    /// Number of updates.
    pub updates: usize,
    /// Number of deletes.
    pub deletes: usize,
}

impl ChangeSummary {
    /// Counts the changes of a batch.
    pub fn of<M>(changes: &[Change<M>]) -> Self {
        changes.iter().fold(Self::default(), |mut summary, change| {
            match change {
                Change::Insert(_) => summary.inserts += 1,
                Change::Update(_) => summary.updates += 1,
                Change::Delete(_) => summary.deletes += 1,
            }
            summary
        })
    }

    /// Total number of changes.
    pub fn total(&self) -> usize {
        self.inserts + self.updates + self.deletes
    }

    /// Returns true if the batch was empty.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Splits a batch into the upsert payloads and delete identifiers a
/// repository save expects.
pub fn split_changes<M: Clone>(changes: &[Change<M>]) -> (Vec<M>, Vec<String>) {
    let mut upserts = Vec::new();
    let mut deletes = Vec::new();

    for change in changes {
        match change {
            Change::Insert(model) | Change::Update(model) => upserts.push(model.clone()),
            Change::Delete(id) => deletes.push(id.clone()),
        }
    }

    (upserts, deletes)
}

/// Applies a batch to a view keyed by identifier.
///
/// Observers use this to keep their own copy of the collection in step with
/// the cache.
pub fn apply_changes<M: Identifiable>(view: &mut HashMap<String, M>, changes: &[Change<M>]) {
    for change in changes {
        match change {
            Change::Insert(model) | Change::Update(model) => {
                view.insert(model.identifier().to_owned(), model.clone());
            }
            Change::Delete(id) => {
                view.remove(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Tag(&'static str, u8);

    impl Identifiable for Tag {
        fn identifier(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn change_accessors() {
        let insert = Change::Insert(Tag("a", 1));
        let delete: Change<Tag> = Change::Delete("b".into());

        assert_eq!(insert.identifier(), "a");
        assert_eq!(insert.item(), Some(&Tag("a", 1)));
        assert!(insert.is_insert());

        assert_eq!(delete.identifier(), "b");
        assert_eq!(delete.item(), None);
        assert!(delete.is_delete());
    }

    #[test]
    fn summary_counts() {
        let changes = vec![
            Change::Insert(Tag("a", 1)),
            Change::Insert(Tag("b", 1)),
            Change::Update(Tag("c", 2)),
            Change::Delete("d".into()),
        ];

        let summary = ChangeSummary::of(&changes);
        assert_eq!(summary.inserts, 2);
        assert_eq!(summary.updates, 1);
        assert_eq!(summary.deletes, 1);
        assert_eq!(summary.total(), 4);
        assert!(ChangeSummary::of::<Tag>(&[]).is_empty());
    }

    #[test]
    fn split_into_upserts_and_deletes() {
        let changes = vec![
            Change::Insert(Tag("a", 1)),
            Change::Delete("b".into()),
            Change::Update(Tag("c", 2)),
        ];

        let (upserts, deletes) = split_changes(&changes);
        assert_eq!(upserts, vec![Tag("a", 1), Tag("c", 2)]);
        assert_eq!(deletes, vec!["b".to_string()]);
    }

    #[test]
    fn apply_to_view() {
        let mut view = HashMap::new();
        view.insert("a".to_string(), Tag("a", 1));
        view.insert("b".to_string(), Tag("b", 1));

        apply_changes(
            &mut view,
            &[
                Change::Update(Tag("a", 2)),
                Change::Delete("b".into()),
                Change::Insert(Tag("c", 1)),
            ],
        );

        assert_eq!(view.len(), 2);
        assert_eq!(view["a"], Tag("a", 2));
        assert_eq!(view["c"], Tag("c", 1));
    }
}

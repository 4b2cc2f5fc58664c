//! Identity-keyed diff between two snapshots.
//!
//! The diff runs in `O(n + m)`: the old snapshot is indexed by identifier
//! once, then the new snapshot is walked a single time.
//!
//! # Batch order
//!
//! Inserts and updates come first, in the order of the new snapshot.
//! Deletes follow, in the order of the old snapshot.
//!
//! # Duplicate identifiers
//!
//! A source is expected to return unique identifiers. If it does not, the
//! last occurrence of an identifier wins and is emitted at its own position;
//! earlier occurrences are ignored.

use crate::change::Change;
use std::collections::{HashMap, HashSet};
use tidecache_storage::Identifiable;

/// Computes the changes that turn `old` into `new`.
///
/// Models present in both with equal values produce no change, so diffing
/// identical snapshots yields an empty batch.
pub fn diff<M: Identifiable>(old: &[M], new: &[M]) -> Vec<Change<M>> {
    let previous: HashMap<&str, &M> = old.iter().map(|m| (m.identifier(), m)).collect();

    let mut last_index: HashMap<&str, usize> = HashMap::with_capacity(new.len());
    for (index, model) in new.iter().enumerate() {
        last_index.insert(model.identifier(), index);
    }

    let mut changes = Vec::new();

    for (index, model) in new.iter().enumerate() {
        let id = model.identifier();
        if last_index.get(id) != Some(&index) {
            continue;
        }

        match previous.get(id) {
            None => changes.push(Change::Insert(model.clone())),
            Some(existing) if *existing != model => changes.push(Change::Update(model.clone())),
            Some(_) => {}
        }
    }

    let mut seen = HashSet::with_capacity(old.len());
    for model in old {
        let id = model.identifier();
        if !last_index.contains_key(id) && seen.insert(id) {
            changes.push(Change::Delete(id.to_owned()));
        }
    }

    changes
}

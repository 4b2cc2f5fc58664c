//! Ordered model table shared by the repository backends.

use crate::model::Identifiable;
use std::collections::{BTreeMap, HashMap};

/// Models keyed by identifier, ordered by last write.
///
/// Every upsert stamps the model with the next write sequence, so the
/// natural order is "least recently written first". Updating a model moves
/// it to the end.
#[derive(Debug, Clone)]
pub(crate) struct Entries<M> {
    by_id: HashMap<String, (u64, M)>,
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl<M> Default for Entries<M> {
    fn default() -> Self {
        Self {
            by_id: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }
}

impl<M: Identifiable> Entries<M> {
    /// Rebuilds a table from `(sequence, model)` records.
    ///
    /// Records are applied in ascending sequence; a later record for the same
    /// identifier replaces the earlier one.
    pub(crate) fn from_records(mut records: Vec<(u64, M)>, next_seq: u64) -> Self {
        records.sort_by_key(|(seq, _)| *seq);

        let mut entries = Self::default();
        for (seq, model) in records {
            let id = model.identifier().to_owned();
            if let Some((old_seq, _)) = entries.by_id.insert(id.clone(), (seq, model)) {
                entries.order.remove(&old_seq);
            }
            entries.order.insert(seq, id);
            entries.next_seq = entries.next_seq.max(seq + 1);
        }
        entries.next_seq = entries.next_seq.max(next_seq);
        entries
    }

    /// Returns the records in natural order.
    pub(crate) fn records(&self) -> Vec<(u64, M)> {
        self.order
            .iter()
            .filter_map(|(seq, id)| self.by_id.get(id).map(|(_, m)| (*seq, m.clone())))
            .collect()
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }

    pub(crate) fn get(&self, id: &str) -> Option<M> {
        self.by_id.get(id).map(|(_, model)| model.clone())
    }

    pub(crate) fn all(&self) -> Vec<M> {
        self.page(0, usize::MAX, false)
    }

    pub(crate) fn page(&self, offset: usize, count: usize, reversed: bool) -> Vec<M> {
        let lookup = |id: &String| self.by_id.get(id).map(|(_, model)| model.clone());

        if reversed {
            self.order
                .values()
                .rev()
                .skip(offset)
                .take(count)
                .filter_map(lookup)
                .collect()
        } else {
            self.order
                .values()
                .skip(offset)
                .take(count)
                .filter_map(lookup)
                .collect()
        }
    }

    /// Applies a batch. Deletes are applied before upserts, so a model that
    /// appears in both ends up present.
    pub(crate) fn apply(&mut self, upserts: Vec<M>, deletes: &[String]) {
        for id in deletes {
            if let Some((seq, _)) = self.by_id.remove(id) {
                self.order.remove(&seq);
            }
        }

        for model in upserts {
            let seq = self.next_seq;
            self.next_seq += 1;

            let id = model.identifier().to_owned();
            if let Some((old_seq, _)) = self.by_id.insert(id.clone(), (seq, model)) {
                self.order.remove(&old_seq);
            }
            self.order.insert(seq, id);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.by_id.clear();
        self.order.clear();
    }
}

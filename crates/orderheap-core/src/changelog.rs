//! Append-only change log with dense sequence numbers.
//!
//! Every committed mutation of the heap lands here as a `ChangeLogEntry`.
//! Sequence numbers start at 1, are gap-free, and are never reused. The log
//! is read either through `get_changes` (forward replay from a cursor) or
//! through the regular read protocol, keyed by sequence number.

use std::collections::BTreeMap;

use crate::error::HeapResult;
use crate::protocol::{Request, Response};
use crate::scan;

/// Net effect of a batch on one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeItem<I, T> {
    Put { index: I, item: T },
    Delete { index: I },
}

impl<I, T> ChangeItem<I, T> {
    pub fn index(&self) -> &I {
        match self {
            ChangeItem::Put { index, .. } | ChangeItem::Delete { index } => index,
        }
    }
}

/// A change stamped with its sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeLogEntry<I, T> {
    pub seq: u64,
    pub item: ChangeItem<I, T>,
}

/// Sequenced, append-only record of mutations.
///
/// Holds no consumer state; every reader tracks its own cursor.
#[derive(Debug, Clone)]
pub struct ChangeLog<I, T> {
    entries: BTreeMap<u64, ChangeItem<I, T>>,
    last_seq: u64,
}

impl<I: Ord + Clone, T: Clone> ChangeLog<I, T> {
    pub fn new() -> Self {
        Self { entries: BTreeMap::new(), last_seq: 0 }
    }

    /// Sequence number of the newest entry (0 when empty).
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append one batch of changes, collapsed to its net effect.
    ///
    /// Successive changes to the same index keep only the last one, placed
    /// where that last one occurred. Returns the appended entries.
    pub fn append(&mut self, items: Vec<ChangeItem<I, T>>) -> Vec<ChangeLogEntry<I, T>> {
        let collapsed = collapse(items);
        let mut appended = Vec::with_capacity(collapsed.len());
        for item in collapsed {
            self.last_seq += 1;
            self.entries.insert(self.last_seq, item.clone());
            appended.push(ChangeLogEntry { seq: self.last_seq, item });
        }
        appended
    }

    /// Entries with `seq >= from_seq`, ascending, at most `limit` of them.
    pub fn get_changes(&self, from_seq: u64, limit: Option<usize>) -> Vec<ChangeLogEntry<I, T>> {
        let from = from_seq.max(1);
        self.entries
            .range(from..)
            .take(limit.unwrap_or(usize::MAX))
            .map(|(seq, item)| ChangeLogEntry { seq: *seq, item: item.clone() })
            .collect()
    }

    /// Read the log through the heap protocol, keyed by sequence number.
    pub fn get(&self, requests: &[Request<u64, ChangeItem<I, T>>]) -> HeapResult<Vec<Response<u64, ChangeItem<I, T>>>> {
        scan::read_batch(&self.entries, requests, None)
    }

    /// Drop every entry after `seq`. Only for batches that never committed.
    pub(crate) fn truncate_after(&mut self, seq: u64) {
        while self.last_seq > seq {
            self.entries.remove(&self.last_seq);
            self.last_seq -= 1;
        }
    }
}

impl<I: Ord + Clone, T: Clone> Default for ChangeLog<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Last-writer-wins per index, ordered by the position of each index's last change.
fn collapse<I: Ord + Clone, T>(items: Vec<ChangeItem<I, T>>) -> Vec<ChangeItem<I, T>> {
    let mut last_position: BTreeMap<I, usize> = BTreeMap::new();
    for (pos, item) in items.iter().enumerate() {
        last_position.insert(item.index().clone(), pos);
    }
    items
        .into_iter()
        .enumerate()
        .filter(|(pos, item)| last_position.get(item.index()) == Some(pos))
        .map(|(_, item)| item)
        .collect()
}

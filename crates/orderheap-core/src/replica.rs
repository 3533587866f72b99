//! Change-log consumer that keeps a local copy of a heap.
//!
//! A replica remembers the last sequence number it applied and pulls from
//! there. Redelivered entries are skipped; a jump past the cursor is an error
//! because the log is dense.

use std::collections::BTreeMap;

use tracing::debug;

use crate::changelog::{ChangeItem, ChangeLogEntry};
use crate::error::{HeapError, HeapResult};
use crate::heap::OrderedHeap;
use crate::index::HeapIndex;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct Replica<I, T> {
    cursor: u64,
    entries: BTreeMap<I, T>,
}

impl<I: Ord + Clone, T: Clone> Replica<I, T> {
    pub fn new() -> Self {
        Self { cursor: 0, entries: BTreeMap::new() }
    }

    /// Resume from a persisted cursor over an existing local copy.
    pub fn resume(cursor: u64, entries: BTreeMap<I, T>) -> Self {
        Self { cursor, entries }
    }

    /// Sequence number of the last applied entry.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Apply a page of entries in order. Returns how many were new.
    pub fn apply(&mut self, changes: &[ChangeLogEntry<I, T>]) -> HeapResult<usize> {
        let mut applied = 0;
        for change in changes {
            if change.seq <= self.cursor {
                continue;
            }
            if change.seq != self.cursor + 1 {
                return Err(HeapError::SequenceGap { expected: self.cursor + 1, found: change.seq });
            }
            match &change.item {
                ChangeItem::Put { index, item } => {
                    self.entries.insert(index.clone(), item.clone());
                }
                ChangeItem::Delete { index } => {
                    self.entries.remove(index);
                }
            }
            self.cursor = change.seq;
            applied += 1;
        }
        Ok(applied)
    }

    /// Fetch and apply everything after the cursor, up to `limit` entries.
    pub fn pull<S>(&mut self, heap: &OrderedHeap<I, T, S>, limit: Option<usize>) -> HeapResult<usize>
    where
        I: HeapIndex + 'static,
        T: 'static,
        S: Store<I, T>,
    {
        let changes = heap.get_changes(self.cursor + 1, limit)?;
        let applied = self.apply(&changes)?;
        if applied > 0 {
            debug!(cursor = self.cursor, applied, "replica advanced");
        }
        Ok(applied)
    }

    pub fn get(&self, index: &I) -> Option<&T> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &BTreeMap<I, T> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<I: Ord + Clone, T: Clone> Default for Replica<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

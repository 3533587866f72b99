//! Backing index behind an `OrderedHeap`.
//!
//! The heap owns exactly one `Store`. Reads borrow from it; mutations may
//! fail, in which case the heap rolls back whatever part of the batch it had
//! already written.

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::error::HeapResult;

/// Ordered iterator over `(index, item)` pairs borrowed from a store.
pub type StoreIter<'a, I, T> = Box<dyn DoubleEndedIterator<Item = (&'a I, &'a T)> + 'a>;

/// Ordered, single-dimension key-value storage.
pub trait Store<I, T> {
    fn get(&self, index: &I) -> Option<&T>;

    /// Entries within the bounds, ascending. Callers guarantee `from <= to`.
    fn range<'a>(&'a self, from: Bound<&I>, to: Bound<&I>) -> StoreIter<'a, I, T>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Greatest live index.
    fn last_index(&self) -> Option<&I>;

    /// Insert or replace, returning the previous item.
    fn insert(&mut self, index: I, item: T) -> HeapResult<Option<T>>;

    /// Remove, returning the previous item.
    fn remove(&mut self, index: &I) -> HeapResult<Option<T>>;
}

/// In-memory store on a `BTreeMap`. Never fails.
///
/// A bare `BTreeMap` is a `Store` too; the change log reads through one.
#[derive(Debug, Clone)]
pub struct BTreeStore<I, T> {
    entries: BTreeMap<I, T>,
}

impl<I: Ord, T> BTreeStore<I, T> {
    pub fn new() -> Self {
        Self { entries: BTreeMap::new() }
    }
}

impl<I: Ord, T> Default for BTreeStore<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Ord, T> FromIterator<(I, T)> for BTreeStore<I, T> {
    fn from_iter<It: IntoIterator<Item = (I, T)>>(iter: It) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

impl<I: Ord, T> Store<I, T> for BTreeMap<I, T> {
    fn get(&self, index: &I) -> Option<&T> {
        BTreeMap::get(self, index)
    }

    fn range<'a>(&'a self, from: Bound<&I>, to: Bound<&I>) -> StoreIter<'a, I, T> {
        Box::new(BTreeMap::range::<I, _>(self, (from, to)))
    }

    fn len(&self) -> usize {
        BTreeMap::len(self)
    }

    fn last_index(&self) -> Option<&I> {
        self.keys().next_back()
    }

    fn insert(&mut self, index: I, item: T) -> HeapResult<Option<T>> {
        Ok(BTreeMap::insert(self, index, item))
    }

    fn remove(&mut self, index: &I) -> HeapResult<Option<T>> {
        Ok(BTreeMap::remove(self, index))
    }
}

impl<I: Ord, T> Store<I, T> for BTreeStore<I, T> {
    fn get(&self, index: &I) -> Option<&T> {
        self.entries.get(index)
    }

    fn range<'a>(&'a self, from: Bound<&I>, to: Bound<&I>) -> StoreIter<'a, I, T> {
        Store::range(&self.entries, from, to)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn last_index(&self) -> Option<&I> {
        Store::last_index(&self.entries)
    }

    fn insert(&mut self, index: I, item: T) -> HeapResult<Option<T>> {
        Store::insert(&mut self.entries, index, item)
    }

    fn remove(&mut self, index: &I) -> HeapResult<Option<T>> {
        Store::remove(&mut self.entries, index)
    }
}

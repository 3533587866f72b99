//! Heap store that fails mutations on a crash plan's schedule.
//!
//! Reads pass straight through. Every `insert` or `remove` counts one step
//! on the shared `CrashPlan`, and the armed step fails with
//! `StoreUnavailable`, which drives the heap's rollback path.
//!
//! A transient store disarms the plan after its failure, so the heap's undo
//! writes succeed. A persistent one keeps failing, which leaves the heap
//! unable to undo.

use std::ops::Bound;
use std::sync::Arc;

use orderheap_core::{HeapError, HeapResult, Store, StoreIter};

use crate::interrupt::CrashPlan;

pub struct FaultStore<S> {
    inner: S,
    plan: Arc<CrashPlan>,
    transient: bool,
}

impl<S> FaultStore<S> {
    /// Fails once at the armed step.
    pub fn new(inner: S, plan: Arc<CrashPlan>) -> Self {
        Self { inner, plan, transient: true }
    }

    /// Fails at the armed step and every mutation after it.
    pub fn persistent(inner: S, plan: Arc<CrashPlan>) -> Self {
        Self { inner, plan, transient: false }
    }

    pub fn plan(&self) -> &Arc<CrashPlan> {
        &self.plan
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn step(&self) -> HeapResult<()> {
        self.plan.tick().map_err(|err| {
            if self.transient {
                self.plan.disarm();
            }
            HeapError::StoreUnavailable { reason: err.to_string() }
        })
    }
}

impl<I, T, S: Store<I, T>> Store<I, T> for FaultStore<S> {
    fn get(&self, index: &I) -> Option<&T> {
        self.inner.get(index)
    }

    fn range<'a>(&'a self, from: Bound<&I>, to: Bound<&I>) -> StoreIter<'a, I, T> {
        self.inner.range(from, to)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn last_index(&self) -> Option<&I> {
        self.inner.last_index()
    }

    fn insert(&mut self, index: I, item: T) -> HeapResult<Option<T>> {
        self.step()?;
        self.inner.insert(index, item)
    }

    fn remove(&mut self, index: &I) -> HeapResult<Option<T>> {
        self.step()?;
        self.inner.remove(index)
    }
}

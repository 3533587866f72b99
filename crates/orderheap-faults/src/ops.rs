//! Value collaborators for fault maps: how to copy a value and how to turn
//! a copy into a detectably corrupt placeholder.

use std::sync::Arc;

pub trait ValueOps<V>: Send + Sync {
    /// Deep copy, so callers never share state with the map.
    fn duplicate(&self, value: &V) -> V;

    /// Corrupt `value` in place.
    fn damage(&self, value: &mut V);
}

impl<V, O: ValueOps<V> + ?Sized> ValueOps<V> for Arc<O> {
    fn duplicate(&self, value: &V) -> V {
        (**self).duplicate(value)
    }

    fn damage(&self, value: &mut V) {
        (**self).damage(value)
    }
}

/// `ValueOps` from a pair of closures.
#[derive(Clone)]
pub struct FnOps<C, D> {
    duplicate: C,
    damage: D,
}

impl<C, D> FnOps<C, D> {
    pub fn new(duplicate: C, damage: D) -> Self {
        Self { duplicate, damage }
    }
}

impl<V, C, D> ValueOps<V> for FnOps<C, D>
where
    C: Fn(&V) -> V + Send + Sync,
    D: Fn(&mut V) + Send + Sync,
{
    fn duplicate(&self, value: &V) -> V {
        (self.duplicate)(value)
    }

    fn damage(&self, value: &mut V) {
        (self.damage)(value)
    }
}

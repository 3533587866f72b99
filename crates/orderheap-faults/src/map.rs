//! Fault-injection map
//!
//! A hash map whose writes pass through every intermediate state a torn
//! write could leave behind. `set` runs four phases separated by interrupt
//! points:
//!
//! remove existing → interrupt → insert damaged copy → interrupt → insert clean copy → interrupt
//!
//! With a yielding interrupt, a concurrent reader can land in each phase;
//! with a crash plan, the map is left in that phase for recovery to face.

use std::hash::Hash;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::error::Interrupted;
use crate::interrupt::Interrupt;
use crate::ops::ValueOps;

pub struct FaultMap<K, V, O> {
    /// Never locked across an interrupt point
    entries: Mutex<HashMap<K, V>>,
    ops: O,
    interrupt: Arc<dyn Interrupt>,
}

impl<K, V, O> FaultMap<K, V, O>
where
    K: Eq + Hash + Clone,
    O: ValueOps<V>,
{
    pub fn new(ops: O, interrupt: Arc<dyn Interrupt>) -> Self {
        Self { entries: Mutex::new(HashMap::new()), ops, interrupt }
    }

    /// Store a copy of `value`, passing through the removed and damaged states.
    pub async fn set(&self, key: K, value: &V) -> Result<(), Interrupted> {
        let clean = self.ops.duplicate(value);
        let mut damaged = self.ops.duplicate(value);
        self.ops.damage(&mut damaged);

        self.interrupt.interrupt().await?;
        self.entries.lock().remove(&key);
        self.interrupt.interrupt().await?;
        self.entries.lock().insert(key.clone(), damaged);
        self.interrupt.interrupt().await?;
        self.entries.lock().insert(key, clean);
        self.interrupt.interrupt().await
    }

    /// Copy of the stored value.
    pub async fn get(&self, key: &K) -> Result<Option<V>, Interrupted> {
        self.interrupt.interrupt().await?;
        let value = self.entries.lock().get(key).map(|v| self.ops.duplicate(v));
        self.interrupt.interrupt().await?;
        Ok(value)
    }

    pub async fn remove(&self, key: &K) -> Result<Option<V>, Interrupted> {
        self.interrupt.interrupt().await?;
        let prior = self.entries.lock().remove(key);
        self.interrupt.interrupt().await?;
        Ok(prior)
    }

    /// Insert without interrupt points. For initial state only.
    pub fn seed(&self, key: K, value: V) {
        self.entries.lock().insert(key, value);
    }

    /// Copy of the whole map, for inspection between steps.
    pub fn snapshot(&self) -> HashMap<K, V> {
        self.entries.lock().iter().map(|(k, v)| (k.clone(), self.ops.duplicate(v))).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::{CrashPlan, Uninterrupted};
    use crate::ops::FnOps;
    use futures::executor::block_on;

    type StringOps = FnOps<fn(&String) -> String, fn(&mut String)>;

    fn duplicate(value: &String) -> String {
        value.clone()
    }

    fn damage(value: &mut String) {
        *value = format!("#damaged#{}", value);
    }

    fn string_ops() -> StringOps {
        FnOps::new(duplicate as fn(&String) -> String, damage as fn(&mut String))
    }

    #[test]
    fn test_set_get_remove() {
        let map = FaultMap::new(string_ops(), Arc::new(Uninterrupted));
        block_on(async {
            map.set(1u32, &"one".to_string()).await.unwrap();
            assert_eq!(map.get(&1).await.unwrap().as_deref(), Some("one"));
            assert_eq!(map.remove(&1).await.unwrap().as_deref(), Some("one"));
            assert_eq!(map.get(&1).await.unwrap(), None);
        });
        assert!(map.is_empty());
    }

    #[test]
    fn test_crash_leaves_each_phase_visible() {
        // step 1: before remove, 2: before damaged insert, 3: before clean insert, 4: after
        let expected = [Some("old"), None, Some("#damaged#new"), Some("new")];
        for (n, want) in expected.iter().enumerate() {
            let plan = Arc::new(CrashPlan::new());
            let map = FaultMap::new(string_ops(), plan.clone());
            map.seed(7u32, "old".to_string());

            plan.arm(n as u64 + 1);
            let result = block_on(map.set(7, &"new".to_string()));
            assert!(result.is_err());
            assert_eq!(map.snapshot().get(&7).map(String::as_str), *want, "crash at step {}", n + 1);
        }
    }
}

//! UnstableDb: a key-value database built from three fault maps.
//!
//! Writes follow a fixed discipline so that a crash at any interrupt point
//! can be classified afterwards by comparing two counters:
//!
//! 1. read the unstable counter and the key's current value
//! 2. persist a change record `{key, old, new}` under `unstable + 1`
//! 3. advance the unstable counter
//! 4. persist (or remove) the data value
//! 5. advance the stable counter
//!
//! Equal counters mean the last write either committed or never became
//! visible. An unstable counter one ahead of the stable one means the write
//! was cut off after its change record was durable, so it can be rolled
//! forward.
//!
//! Readers take no lock. They validate against the unstable counter the
//! way a seqlock reader does, and while a write is in flight they answer
//! from the change record's prior value, so a damaged placeholder in the
//! data map is never returned.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use futures::lock::Mutex;
use tracing::{debug, trace, warn};

use crate::error::{FaultError, FaultResult, Interrupted};
use crate::interrupt::Interrupt;
use crate::map::FaultMap;
use crate::ops::ValueOps;
use crate::sealed::{SealedCounter, SealedOps};

/// Slots of the state map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterSlot {
    /// Sequence of the newest change record made visible
    Unstable,
    /// Sequence of the newest write fully applied to the data map
    Stable,
}

/// Before/after image of one write. `new: None` is a delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord<K, V> {
    pub key: K,
    pub old: Option<V>,
    pub new: Option<V>,
}

/// Lifts value collaborators to change records.
///
/// Damage corrupts both images. A missing image is filled with a damaged
/// copy of the other one, so a torn record never looks like a delete.
pub struct RecordOps<O> {
    inner: Arc<O>,
}

impl<K, V, O> ValueOps<ChangeRecord<K, V>> for RecordOps<O>
where
    K: Clone,
    O: ValueOps<V>,
{
    fn duplicate(&self, record: &ChangeRecord<K, V>) -> ChangeRecord<K, V> {
        ChangeRecord {
            key: record.key.clone(),
            old: record.old.as_ref().map(|v| self.inner.duplicate(v)),
            new: record.new.as_ref().map(|v| self.inner.duplicate(v)),
        }
    }

    fn damage(&self, record: &mut ChangeRecord<K, V>) {
        if record.old.is_none() {
            record.old = record.new.as_ref().map(|v| self.inner.duplicate(v));
        }
        if record.new.is_none() {
            record.new = record.old.as_ref().map(|v| self.inner.duplicate(v));
        }
        for image in [&mut record.old, &mut record.new].into_iter().flatten() {
            self.inner.damage(image);
        }
    }
}

/// How a crashed database was brought back to a consistent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Counters agreed; any orphaned change record was discarded
    Clean,
    /// The interrupted write was completed from its change record
    RolledForward { seq: u64 },
    /// The interrupted write was abandoned before it became visible
    RolledBack { seq: u64 },
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Read attempts before giving up with `Contended`
    pub max_read_attempts: usize,
}

impl DbConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_read_attempts == 0 {
            return Err("max_read_attempts must be > 0".into());
        }
        Ok(())
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self { max_read_attempts: 64 }
    }
}

/// State of a counter slot as read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Counter {
    Absent,
    Damaged,
    Value(u64),
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Counter::Absent => f.write_str("absent"),
            Counter::Damaged => f.write_str("damaged"),
            Counter::Value(v) => write!(f, "{}", v),
        }
    }
}

pub struct UnstableDb<K, V, O> {
    data: FaultMap<K, V, Arc<O>>,
    changes: FaultMap<u64, ChangeRecord<K, V>, RecordOps<O>>,
    state: FaultMap<CounterSlot, SealedCounter, SealedOps>,
    /// Serializes writers and recovery
    writer: Mutex<()>,
    config: DbConfig,
}

impl<K, V, O> UnstableDb<K, V, O>
where
    K: Eq + Hash + Clone + fmt::Debug,
    O: ValueOps<V>,
{
    /// Empty database with both counters at 0. All three maps share
    /// `interrupt`.
    pub fn new(ops: O, interrupt: Arc<dyn Interrupt>, config: DbConfig) -> FaultResult<Self> {
        config.validate().map_err(FaultError::InvalidConfig)?;
        let ops = Arc::new(ops);
        let db = Self {
            data: FaultMap::new(Arc::clone(&ops), Arc::clone(&interrupt)),
            changes: FaultMap::new(RecordOps { inner: ops }, Arc::clone(&interrupt)),
            state: FaultMap::new(SealedOps, interrupt),
            writer: Mutex::new(()),
            config,
        };
        db.state.seed(CounterSlot::Unstable, SealedCounter::new(0));
        db.state.seed(CounterSlot::Stable, SealedCounter::new(0));
        Ok(db)
    }

    pub async fn set(&self, key: K, value: V) -> FaultResult<()> {
        self.write(key, Some(value)).await
    }

    pub async fn delete(&self, key: &K) -> FaultResult<()> {
        self.write(key.clone(), None).await
    }

    async fn write(&self, key: K, new: Option<V>) -> FaultResult<()> {
        let _writer = self.writer.lock().await;

        let unstable = self.counter(CounterSlot::Unstable).await?;
        let stable = self.counter(CounterSlot::Stable).await?;
        let seq = match (unstable, stable) {
            (Counter::Value(u), Counter::Value(s)) if u == s => u + 1,
            _ => {
                return Err(FaultError::RecoveryRequired { unstable: unstable.to_string(), stable: stable.to_string() })
            }
        };

        let old = self.data.get(&key).await?;
        let record = ChangeRecord { key: key.clone(), old, new };
        self.changes.set(seq, &record).await?;
        self.state.set(CounterSlot::Unstable, &SealedCounter::new(seq)).await?;
        self.apply(&record).await?;
        self.state.set(CounterSlot::Stable, &SealedCounter::new(seq)).await?;

        debug!(seq, key = ?record.key, delete = record.new.is_none(), "write committed");
        Ok(())
    }

    async fn apply(&self, record: &ChangeRecord<K, V>) -> Result<(), Interrupted> {
        match &record.new {
            Some(value) => self.data.set(record.key.clone(), value).await,
            None => self.data.remove(&record.key).await.map(|_| ()),
        }
    }

    /// Committed value of `key`: the value before or after any write in
    /// flight, never a torn one.
    pub async fn get(&self, key: &K) -> FaultResult<Option<V>> {
        for attempt in 1..=self.config.max_read_attempts {
            let Counter::Value(unstable) = self.counter(CounterSlot::Unstable).await? else { continue };
            let Counter::Value(stable) = self.counter(CounterSlot::Stable).await? else { continue };

            let value = if unstable == stable {
                self.data.get(key).await?
            } else if unstable == stable + 1 {
                match self.changes.get(&unstable).await? {
                    Some(record) if &record.key == key => record.old,
                    Some(_) => self.data.get(key).await?,
                    None => continue,
                }
            } else {
                continue;
            };

            if self.counter(CounterSlot::Unstable).await? == Counter::Value(unstable) {
                return Ok(value);
            }
            trace!(attempt, unstable, "read overlapped a write, retrying");
        }
        Err(FaultError::Contended { attempts: self.config.max_read_attempts })
    }

    /// Bring the maps back to a consistent state after a crash.
    pub async fn recover(&self) -> FaultResult<RecoveryOutcome> {
        let _writer = self.writer.lock().await;

        let unstable = self.counter(CounterSlot::Unstable).await?;
        let stable = self.counter(CounterSlot::Stable).await?;
        let outcome = match (unstable, stable) {
            (Counter::Value(u), Counter::Value(s)) if u == s => {
                if self.changes.remove(&(u + 1)).await?.is_some() {
                    debug!(seq = u + 1, "discarded orphaned change record");
                }
                RecoveryOutcome::Clean
            }
            (Counter::Value(u), Counter::Value(s)) if u == s + 1 => self.roll_forward(u).await?,
            (Counter::Value(u), Counter::Absent | Counter::Damaged) => self.roll_forward(u).await?,
            (Counter::Absent | Counter::Damaged, Counter::Value(s)) => {
                self.changes.remove(&(s + 1)).await?;
                self.state.set(CounterSlot::Unstable, &SealedCounter::new(s)).await?;
                RecoveryOutcome::RolledBack { seq: s + 1 }
            }
            _ => {
                return Err(FaultError::CorruptState {
                    reason: format!("unstable counter {}, stable counter {}", unstable, stable),
                })
            }
        };

        if outcome != RecoveryOutcome::Clean {
            warn!(?outcome, "recovered interrupted write");
        }
        Ok(outcome)
    }

    async fn roll_forward(&self, seq: u64) -> FaultResult<RecoveryOutcome> {
        let record = self.changes.get(&seq).await?.ok_or_else(|| FaultError::CorruptState {
            reason: format!("change record {} missing behind the unstable counter", seq),
        })?;
        self.apply(&record).await?;
        self.state.set(CounterSlot::Stable, &SealedCounter::new(seq)).await?;
        Ok(RecoveryOutcome::RolledForward { seq })
    }

    async fn counter(&self, slot: CounterSlot) -> Result<Counter, Interrupted> {
        Ok(match self.state.get(&slot).await? {
            None => Counter::Absent,
            Some(sealed) => sealed.read().map_or(Counter::Damaged, Counter::Value),
        })
    }

    /// Raw data map, for tests that inspect torn states directly.
    pub fn data(&self) -> &FaultMap<K, V, Arc<O>> {
        &self.data
    }

    /// Sequence numbers of the change records currently held.
    pub fn change_seqs(&self) -> Vec<u64> {
        let mut seqs: Vec<u64> = self.changes.snapshot().keys().copied().collect();
        seqs.sort_unstable();
        seqs
    }
}

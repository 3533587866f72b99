//! OrderHeap Faults — Interruption Harnesses for Write Atomicity
//!
//! Test-only building blocks that expose every intermediate state a write
//! can be caught in.
//!
//! # Architecture
//!
//! - **Interrupt**: awaited suspension point; plans yield, crash, or do nothing
//! - **FaultMap**: map whose `set` passes through removed and damaged states
//! - **UnstableDb**: data, change-record and counter maps with crash recovery
//! - **FaultStore**: heap `Store` that fails mutations on a crash schedule
//!
//! Async operations are executor-agnostic; the tests drive them with
//! `futures::executor::block_on`.

pub mod db;
pub mod error;
pub mod interrupt;
pub mod map;
pub mod ops;
pub mod sealed;
pub mod store;

pub use db::{ChangeRecord, CounterSlot, DbConfig, RecordOps, RecoveryOutcome, UnstableDb};
pub use error::{FaultError, FaultResult, Interrupted};
pub use interrupt::{CrashPlan, Interrupt, Uninterrupted, Yielding};
pub use map::FaultMap;
pub use ops::{FnOps, ValueOps};
pub use sealed::{SealedCounter, SealedOps};
pub use store::FaultStore;

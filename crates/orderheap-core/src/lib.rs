//! OrderHeap Core — Transactional Ordered Key-Value Heap
//!
//! An in-process key-value store over a single ordered index, driven by
//! batches of requests, with a derived change log that consumers replay
//! from their own cursor.
//!
//! # Architecture
//!
//! - **Protocol**: closed request/response vocabulary (get, getCount, getRange, add, put, delete, deleteRange)
//! - **Heap**: batches apply atomically in a fixed order (deletes, puts, adds)
//! - **Change log**: every committed batch appends its net effect under dense sequence numbers
//! - **Replica**: a consumer that pulls the log and keeps a local copy
//!
//! # No Persistence
//!
//! The heap lives in memory behind the `Store` trait. Durability testing of
//! layered stores lives in a separate crate (orderheap-faults).

pub mod changelog;
pub mod config;
pub mod error;
pub mod format;
pub mod heap;
pub mod index;
pub mod protocol;
pub mod replica;
pub mod scan;
pub mod store;
pub mod subscribe;

// Re-export key types for convenience
pub use changelog::{ChangeItem, ChangeLog, ChangeLogEntry};
pub use config::Config;
pub use error::{HeapError, HeapResult};
pub use heap::{OrderedHeap, Transaction};
pub use index::HeapIndex;
pub use protocol::{Entry, KeyRange, Projection, RangeOutput, Request, RequestKind, Response, PROTOCOL_VERSION};
pub use replica::Replica;
pub use store::{BTreeStore, Store, StoreIter};
pub use subscribe::{Subscribers, Subscription};

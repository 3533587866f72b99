//! Ordered heap: store, change log and transactions behind one lock.
//!
//! OrderedHeap combines an ordered store with a sequenced change log behind
//! a single RwLock, so a mutation and its log entries commit together.
//!
//! **Read path**: shared lock, evaluated straight from the store
//! **Write path**: exclusive lock, stage → validate → apply with undo log → append to change log
//! **Notification**: subscribers run after the lock is released

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;
use tracing::{debug, error, info, trace, warn};

use crate::changelog::{ChangeItem, ChangeLog, ChangeLogEntry};
use crate::config::Config;
use crate::error::{HeapError, HeapResult};
use crate::index::HeapIndex;
use crate::protocol::{Request, Response};
use crate::scan::{self, resolve_bounds};
use crate::store::{BTreeStore, Store};
use crate::subscribe::{Subscribers, Subscription};

struct HeapState<I, T, S> {
    store: S,
    log: ChangeLog<I, T>,
    /// Highest index ever handed out by `Add`
    last_allocated: Option<I>,
    closed: bool,
}

impl<I, T, S> HeapState<I, T, S> {
    fn ensure_open(&self) -> HeapResult<()> {
        if self.closed {
            return Err(HeapError::unavailable("heap is closed"));
        }
        Ok(())
    }
}

/// Transactional ordered key-value heap.
///
/// All public methods take `&self`. Readers share the state lock; `change`
/// and `use_transaction` hold it exclusively, so a reader never observes a
/// partially applied batch.
pub struct OrderedHeap<I, T, S = BTreeStore<I, T>> {
    state: RwLock<HeapState<I, T, S>>,
    subscribers: Subscribers<[ChangeLogEntry<I, T>]>,
    config: Config,
}

impl<I, T> OrderedHeap<I, T>
where
    I: HeapIndex + 'static,
    T: Clone + 'static,
{
    /// Empty heap on an in-memory `BTreeStore`.
    pub fn new(config: Config) -> HeapResult<Self> {
        Self::with_store(BTreeStore::new(), config)
    }
}

impl<I, T, S> OrderedHeap<I, T, S>
where
    I: HeapIndex + 'static,
    T: Clone + 'static,
    S: Store<I, T>,
{
    /// Heap over an existing store. Entries already in the store are live
    /// but have no change-log history.
    pub fn with_store(store: S, config: Config) -> HeapResult<Self> {
        config.validate().map_err(HeapError::InvalidConfig)?;
        let last_allocated = store.last_index().cloned();
        Ok(Self {
            state: RwLock::new(HeapState {
                store,
                log: ChangeLog::new(),
                last_allocated,
                closed: false,
            }),
            subscribers: Subscribers::new(),
            config,
        })
    }

    /// Evaluate a read-only batch.
    pub fn get(&self, requests: &[Request<I, T>]) -> HeapResult<Vec<Response<I, T>>> {
        let state = self.state.read();
        state.ensure_open()?;
        check_limits(&self.config, requests)?;
        trace!(heap = %self.config.label, requests = requests.len(), "get");
        scan::read_batch(&state.store, requests, self.config.default_scan_limit)
    }

    /// Apply a write batch atomically: deletes, then puts, then adds.
    pub fn change(&self, requests: Vec<Request<I, T>>) -> HeapResult<Vec<Response<I, T>>> {
        self.use_transaction(|tx| tx.change(requests))
    }

    /// Run `func` with exclusive access to the heap.
    ///
    /// Reads inside the transaction must precede every change. If `func`
    /// returns an error, every batch it applied is rolled back.
    pub fn use_transaction<R, F>(&self, func: F) -> HeapResult<R>
    where
        F: FnOnce(&mut Transaction<'_, I, T, S>) -> HeapResult<R>,
    {
        let mut guard = self.state.write();
        guard.ensure_open()?;

        let log_mark = guard.log.last_seq();
        let allocated_mark = guard.last_allocated.clone();
        let mut tx = Transaction {
            state: &mut *guard,
            config: &self.config,
            batches: 0,
            undo: Vec::new(),
            log_mark,
            allocated_mark,
            appended: Vec::new(),
            committed: false,
        };

        // Dropping an uncommitted transaction rolls it back, so a panic in
        // `func` unwinds through the same path as an error.
        match func(&mut tx) {
            Ok(value) => {
                tx.committed = true;
                let appended = std::mem::take(&mut tx.appended);
                drop(tx);
                drop(guard);
                if !appended.is_empty() {
                    self.subscribers.publish(&appended);
                }
                Ok(value)
            }
            Err(err) => {
                if tx.batches > 0 {
                    warn!(heap = %self.config.label, error = %err, "rolling back transaction");
                }
                drop(tx);
                Err(err)
            }
        }
    }

    /// Change-log entries with `seq >= from_seq`, ascending, at most `limit`.
    pub fn get_changes(&self, from_seq: u64, limit: Option<usize>) -> HeapResult<Vec<ChangeLogEntry<I, T>>> {
        let state = self.state.read();
        state.ensure_open()?;
        Ok(state.log.get_changes(from_seq, limit))
    }

    /// Read the change log through the heap protocol, keyed by sequence number.
    pub fn get_log(&self, requests: &[Request<u64, ChangeItem<I, T>>]) -> HeapResult<Vec<Response<u64, ChangeItem<I, T>>>> {
        let state = self.state.read();
        state.ensure_open()?;
        state.log.get(requests)
    }

    /// Register a callback that receives the log entries of every commit.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[ChangeLogEntry<I, T>]) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    /// Refuse all further calls with `StoreUnavailable`.
    pub fn close(&self) {
        let mut state = self.state.write();
        if !state.closed {
            state.closed = true;
            info!(heap = %self.config.label, entries = state.store.len(), last_seq = state.log.last_seq(), "heap closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.state.read().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().store.is_empty()
    }

    /// Sequence number of the newest change-log entry (0 when none).
    pub fn last_seq(&self) -> u64 {
        self.state.read().log.last_seq()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl<I, T, S> std::fmt::Debug for OrderedHeap<I, T, S>
where
    S: Store<I, T>,
    I: Ord + Clone,
    T: Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("OrderedHeap")
            .field("label", &self.config.label)
            .field("entries", &state.store.len())
            .field("last_seq", &state.log.last_seq())
            .field("closed", &state.closed)
            .finish()
    }
}

/// Exclusive view of the heap for the duration of `use_transaction`.
pub struct Transaction<'h, I, T, S>
where
    I: Ord + Clone,
    T: Clone,
    S: Store<I, T>,
{
    state: &'h mut HeapState<I, T, S>,
    config: &'h Config,
    /// Change batches issued so far
    batches: usize,
    /// Prior values of every index written, oldest first
    undo: Vec<(I, Option<T>)>,
    log_mark: u64,
    allocated_mark: Option<I>,
    appended: Vec<ChangeLogEntry<I, T>>,
    committed: bool,
}

/// Writes of one batch, staged before anything touches the store.
struct Staged<I, T> {
    overlay: BTreeMap<I, Option<T>>,
    responses: Vec<Option<Response<I, T>>>,
    allocated: Option<I>,
}

impl<'h, I, T, S> Transaction<'h, I, T, S>
where
    I: HeapIndex,
    T: Clone,
    S: Store<I, T>,
{
    /// Read batch. Fails once any change has been issued in this transaction.
    pub fn get(&mut self, requests: &[Request<I, T>]) -> HeapResult<Vec<Response<I, T>>> {
        if self.batches > 0 {
            return Err(HeapError::TransactionOrderViolation { changes: self.batches });
        }
        check_limits(self.config, requests)?;
        scan::read_batch(&self.state.store, requests, self.config.default_scan_limit)
    }

    /// Write batch, atomic on its own and undone with the transaction.
    pub fn change(&mut self, requests: Vec<Request<I, T>>) -> HeapResult<Vec<Response<I, T>>> {
        self.batches += 1;
        check_limits(self.config, &requests)?;
        if let Some((pos, req)) = requests.iter().enumerate().find(|(_, r)| r.kind().is_read()) {
            return Err(HeapError::UnexpectedRequest { kind: req.kind(), request: pos, context: "change" });
        }

        let staged = self.stage(requests)?;
        let items = self.apply(staged.overlay)?;
        if staged.allocated.is_some() {
            self.state.last_allocated = staged.allocated;
        }

        let appended = self.state.log.append(items);
        if let (Some(first), Some(last)) = (appended.first(), appended.last()) {
            debug!(heap = %self.config.label, first_seq = first.seq, last_seq = last.seq, changes = appended.len(), "committed batch");
        }
        self.appended.extend(appended);

        Ok(staged.responses.into_iter().flatten().collect())
    }

    /// Number of change batches issued so far.
    pub fn changes_issued(&self) -> usize {
        self.batches
    }

    fn is_live(&self, overlay: &BTreeMap<I, Option<T>>, index: &I) -> bool {
        match overlay.get(index) {
            Some(staged) => staged.is_some(),
            None => self.state.store.get(index).is_some(),
        }
    }

    /// Resolve the batch into an overlay of final values per index.
    fn stage(&self, requests: Vec<Request<I, T>>) -> HeapResult<Staged<I, T>> {
        let mut order: Vec<usize> = (0..requests.len()).collect();
        order.sort_by_key(|&pos| requests[pos].kind().phase());

        let mut slots: Vec<Option<Request<I, T>>> = requests.into_iter().map(Some).collect();
        let mut staged = Staged {
            overlay: BTreeMap::new(),
            responses: (0..slots.len()).map(|_| None).collect(),
            allocated: None,
        };

        for pos in order {
            let Some(request) = slots[pos].take() else { continue };
            let response = match request {
                Request::Delete { indexes } => {
                    for index in indexes {
                        staged.overlay.insert(index, None);
                    }
                    Response::Delete
                }
                Request::DeleteRange { range } => {
                    if let Some((lower, upper)) = resolve_bounds(&range, false)? {
                        let mut doomed: Vec<I> = self.state.store.range(lower, upper).map(|(i, _)| i.clone()).collect();
                        doomed.extend(
                            staged.overlay.range::<I, _>((lower, upper)).filter(|(_, v)| v.is_some()).map(|(i, _)| i.clone()),
                        );
                        for index in doomed {
                            staged.overlay.insert(index, None);
                        }
                    }
                    Response::DeleteRange
                }
                Request::Put { entries, require_existing } => {
                    {
                        let mut seen = BTreeSet::new();
                        for (index, _) in &entries {
                            if !seen.insert(index) {
                                return Err(HeapError::DuplicateIndex { index: format!("{:?}", index), request: pos });
                            }
                            if require_existing && !self.is_live(&staged.overlay, index) {
                                return Err(HeapError::IndexNotFound { index: format!("{:?}", index), request: pos });
                            }
                        }
                    }
                    for (index, item) in entries {
                        staged.overlay.insert(index, Some(item));
                    }
                    Response::Put
                }
                Request::Add { items, return_indexes } => {
                    let mut indexes = Vec::with_capacity(items.len());
                    for item in items {
                        let floor = self.allocation_floor(&staged);
                        let index = I::successor(floor.as_ref()).ok_or_else(|| HeapError::IndexSpaceExhausted {
                            last: format!("{:?}", floor),
                        })?;
                        staged.overlay.insert(index.clone(), Some(item));
                        staged.allocated = Some(index.clone());
                        indexes.push(index);
                    }
                    Response::Add { indexes: return_indexes.then_some(indexes) }
                }
                // rejected before staging
                Request::Get { .. } | Request::GetCount | Request::GetRange { .. } => continue,
            };
            staged.responses[pos] = Some(response);
        }

        Ok(staged)
    }

    /// Greatest index that an allocation must exceed.
    fn allocation_floor(&self, staged: &Staged<I, T>) -> Option<I> {
        let allocated = staged.allocated.as_ref().or(self.state.last_allocated.as_ref());
        let live = self.state.store.last_index();
        let touched = staged.overlay.iter().rev().find(|(_, v)| v.is_some()).map(|(i, _)| i);
        allocated.max(live).max(touched).cloned()
    }

    /// Write the overlay to the store in index order, returning the net
    /// change-log items. On a store failure the batch is undone first.
    fn apply(&mut self, overlay: BTreeMap<I, Option<T>>) -> HeapResult<Vec<ChangeItem<I, T>>> {
        let mut undo: Vec<(I, Option<T>)> = Vec::with_capacity(overlay.len());
        let mut items = Vec::with_capacity(overlay.len());

        for (index, next) in overlay {
            let result = match &next {
                Some(item) => self.state.store.insert(index.clone(), item.clone()),
                None => self.state.store.remove(&index),
            };
            let prior = match result {
                Ok(prior) => prior,
                Err(err) => {
                    warn!(heap = %self.config.label, error = %err, applied = undo.len(), "store failed mid-batch, undoing");
                    undo_writes(self.state, undo, &self.config.label);
                    return Err(err);
                }
            };
            match (next, &prior) {
                (Some(item), _) => items.push(ChangeItem::Put { index: index.clone(), item }),
                (None, Some(_)) => items.push(ChangeItem::Delete { index: index.clone() }),
                (None, None) => {}
            }
            undo.push((index, prior));
        }

        self.undo.extend(undo);
        Ok(items)
    }
}

impl<I, T, S> Transaction<'_, I, T, S>
where
    I: Ord + Clone,
    T: Clone,
    S: Store<I, T>,
{
    fn rollback(&mut self) {
        let undo = std::mem::take(&mut self.undo);
        undo_writes(self.state, undo, &self.config.label);
        self.state.log.truncate_after(self.log_mark);
        self.state.last_allocated = self.allocated_mark.take();
        self.appended.clear();
    }
}

impl<I, T, S> Drop for Transaction<'_, I, T, S>
where
    I: Ord + Clone,
    T: Clone,
    S: Store<I, T>,
{
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if std::thread::panicking() && self.batches > 0 {
            warn!(heap = %self.config.label, batches = self.batches, "transaction panicked, rolling back");
        }
        self.rollback();
    }
}

/// Restore prior values, newest write first. A store that cannot even undo
/// leaves the heap closed.
fn undo_writes<I, T, S: Store<I, T>>(state: &mut HeapState<I, T, S>, undo: Vec<(I, Option<T>)>, label: &str) {
    for (index, prior) in undo.into_iter().rev() {
        let result = match prior {
            Some(item) => state.store.insert(index, item).map(|_| ()),
            None => state.store.remove(&index).map(|_| ()),
        };
        if let Err(err) = result {
            error!(heap = %label, error = %err, "undo failed, closing heap");
            state.closed = true;
            return;
        }
    }
}

fn check_limits<I, T>(config: &Config, requests: &[Request<I, T>]) -> HeapResult<()> {
    if requests.len() > config.max_batch_requests {
        return Err(HeapError::LimitExceeded {
            component: "batch",
            size: requests.len() as u64,
            limit: config.max_batch_requests as u64,
        });
    }
    for request in requests {
        let count = request.entry_count();
        if count > config.max_request_entries {
            return Err(HeapError::LimitExceeded {
                component: "request entries",
                size: count as u64,
                limit: config.max_request_entries as u64,
            });
        }
    }
    Ok(())
}

//! Integration tests: OrderedHeap batches over a failing store.
//!
//! Each test first measures how many store mutations a batch makes, then
//! replays it once per mutation with a failure injected there. A failed
//! batch must leave entries, change log and subscribers exactly as before.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use orderheap_core::{BTreeStore, Config, HeapError, KeyRange, OrderedHeap, Projection, RangeOutput, Request, Response};
use orderheap_faults::{CrashPlan, FaultStore};

type Heap = OrderedHeap<u64, String, FaultStore<BTreeStore<u64, String>>>;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn seeded_heap(plan: &Arc<CrashPlan>, persistent: bool) -> Heap {
    let seed: BTreeStore<u64, String> = (1..=4).map(|i| (i, format!("v{}", i))).collect();
    let store = if persistent {
        FaultStore::persistent(seed, Arc::clone(plan))
    } else {
        FaultStore::new(seed, Arc::clone(plan))
    };
    OrderedHeap::with_store(store, Config::default()).unwrap()
}

fn mixed_batch() -> Vec<Request<u64, String>> {
    vec![
        Request::add(vec!["x".to_string(), "y".to_string()]),
        Request::put(vec![(2, "P2".to_string()), (9, "P9".to_string())]),
        Request::delete(vec![1, 3]),
        Request::delete_range(KeyRange::half_open(4, 5)),
    ]
}

fn contents(heap: &Heap) -> Vec<(u64, String)> {
    let request = Request::GetRange { range: KeyRange::all(), limit: None, desc: false, projection: Projection::Entries };
    match heap.get(&[request]).unwrap().remove(0) {
        Response::GetRange { output: RangeOutput::Entries(entries) } => entries,
        other => panic!("unexpected response {:?}", other),
    }
}

/// Store mutations made by `batch` on a fresh seeded heap.
fn count_mutations(batch: Vec<Request<u64, String>>) -> u64 {
    let plan = Arc::new(CrashPlan::new());
    let heap = seeded_heap(&plan, false);
    heap.change(batch).unwrap();
    plan.steps()
}

// ---------------------------------------------------------------------------
// Single batch
// ---------------------------------------------------------------------------

#[test]
fn test_failure_at_every_mutation_is_all_or_nothing() {
    let mutations = count_mutations(mixed_batch());
    assert_eq!(mutations, 7);

    let clean = {
        let plan = Arc::new(CrashPlan::new());
        let heap = seeded_heap(&plan, false);
        heap.change(mixed_batch()).unwrap();
        (contents(&heap), heap.get_changes(1, None).unwrap())
    };

    for step in 1..=mutations {
        let plan = Arc::new(CrashPlan::new());
        let heap = seeded_heap(&plan, false);
        let before = contents(&heap);

        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        let _subscription = heap.subscribe(move |entries| {
            counter.fetch_add(entries.len(), Ordering::SeqCst);
        });

        plan.arm(step);
        let err = heap.change(mixed_batch()).unwrap_err();
        assert!(matches!(err, HeapError::StoreUnavailable { .. }), "step {}: {:?}", step, err);

        assert_eq!(contents(&heap), before, "step {}", step);
        assert_eq!(heap.last_seq(), 0, "step {}", step);
        assert_eq!(notified.load(Ordering::SeqCst), 0, "step {}", step);
        assert!(!heap.is_closed());

        // the same batch succeeds once the store recovers, with the same outcome
        heap.change(mixed_batch()).unwrap();
        assert_eq!((contents(&heap), heap.get_changes(1, None).unwrap()), clean, "step {}", step);
    }
}

#[test]
fn test_failed_undo_closes_heap() {
    let plan = Arc::new(CrashPlan::new());
    let heap = seeded_heap(&plan, true);
    plan.arm(3);
    assert!(heap.change(mixed_batch()).is_err());
    assert!(heap.is_closed());
    assert!(matches!(heap.get(&[Request::GetCount]), Err(HeapError::StoreUnavailable { .. })));
}

#[test]
fn test_failure_on_first_mutation_needs_no_undo() {
    let plan = Arc::new(CrashPlan::new());
    let heap = seeded_heap(&plan, true);
    plan.arm(1);
    assert!(heap.change(mixed_batch()).is_err());
    assert!(!heap.is_closed());
    assert_eq!(heap.len(), 4);
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

#[test]
fn test_failure_in_second_batch_undoes_first() {
    let plan = Arc::new(CrashPlan::new());
    let heap = seeded_heap(&plan, false);
    let before = contents(&heap);

    // first batch makes two mutations, the second fails on its own first
    plan.arm(3);
    let result = heap.use_transaction(|tx| {
        tx.change(vec![Request::put(vec![(1, "a".to_string()), (7, "b".to_string())])])?;
        tx.change(vec![Request::delete(vec![2]), Request::add(vec!["c".to_string()])])
    });

    assert!(matches!(result, Err(HeapError::StoreUnavailable { .. })));
    assert_eq!(contents(&heap), before);
    assert_eq!(heap.last_seq(), 0);

    // allocation picks up where the store ends, not where the aborted add got to
    let responses = heap.change(vec![Request::add(vec!["d".to_string()])]).unwrap();
    assert_eq!(responses[0].clone().into_indexes(), Some(vec![5]));
}

//! Integration tests: UnstableDb under crashes and concurrent readers.
//!
//! Crash tests enumerate every interrupt step of a write, crash there,
//! recover, and check the key holds either the old or the new value.
//! Concurrency tests join a writer and a reader on one thread with a
//! yielding interrupt so the reader lands between every write phase.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::executor::block_on;
use orderheap_faults::{
    CrashPlan, DbConfig, FaultError, FaultMap, FnOps, Interrupt, RecoveryOutcome, UnstableDb, Yielding,
};

const DAMAGED: i64 = i64::MIN;

type Ops = FnOps<fn(&i64) -> i64, fn(&mut i64)>;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn duplicate(value: &i64) -> i64 {
    *value
}

fn damage(value: &mut i64) {
    *value = DAMAGED;
}

fn ops() -> Ops {
    FnOps::new(duplicate as fn(&i64) -> i64, damage as fn(&mut i64))
}

fn test_db(interrupt: Arc<dyn Interrupt>) -> UnstableDb<String, i64, Ops> {
    UnstableDb::new(ops(), interrupt, DbConfig::default()).unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

enum Write {
    Set(&'static str, i64),
    Delete(&'static str),
}

async fn run(db: &UnstableDb<String, i64, Ops>, write: &Write) -> Result<(), FaultError> {
    match write {
        Write::Set(key, value) => db.set(key.to_string(), *value).await,
        Write::Delete(key) => db.delete(&key.to_string()).await,
    }
}

/// Interrupt steps taken by `write`, optionally after seeding "a" = 1.
fn count_steps(seeded: bool, write: &Write) -> u64 {
    let plan = Arc::new(CrashPlan::new());
    let db = test_db(plan.clone());
    block_on(async {
        if seeded {
            db.set("a".to_string(), 1).await.unwrap();
        }
        let before = plan.steps();
        run(&db, write).await.unwrap();
        plan.steps() - before
    })
}

// ---------------------------------------------------------------------------
// Crash enumeration
// ---------------------------------------------------------------------------

#[test]
fn test_crash_at_every_step_of_set() {
    init_tracing();
    let steps = count_steps(true, &Write::Set("a", 2));
    assert!(steps > 0);

    let mut rolled_forward = 0;
    let mut rolled_back = 0;
    for step in 1..=steps {
        let plan = Arc::new(CrashPlan::new());
        let db = test_db(plan.clone());
        block_on(async {
            db.set("a".to_string(), 1).await.unwrap();
            plan.arm(step);
            let result = db.set("a".to_string(), 2).await;
            assert!(matches!(result, Err(FaultError::Interrupted(_))), "step {}: {:?}", step, result);
            plan.disarm();

            match db.recover().await.unwrap() {
                RecoveryOutcome::RolledForward { seq } => {
                    assert_eq!(seq, 2);
                    rolled_forward += 1;
                }
                RecoveryOutcome::RolledBack { seq } => {
                    assert_eq!(seq, 2);
                    rolled_back += 1;
                }
                RecoveryOutcome::Clean => {}
            }

            let value = db.get(&"a".to_string()).await.unwrap();
            assert!(value == Some(1) || value == Some(2), "step {}: {:?}", step, value);
            assert!(db.data().snapshot().values().all(|v| *v != DAMAGED), "step {}", step);

            // a recovered database accepts writes again
            db.set("a".to_string(), 3).await.unwrap();
            assert_eq!(db.get(&"a".to_string()).await.unwrap(), Some(3));
            assert_eq!(db.recover().await.unwrap(), RecoveryOutcome::Clean);
        });
    }
    assert!(rolled_forward > 0);
    assert!(rolled_back > 0);
}

#[test]
fn test_crash_at_every_step_of_delete() {
    let steps = count_steps(true, &Write::Delete("a"));

    for step in 1..=steps {
        let plan = Arc::new(CrashPlan::new());
        let db = test_db(plan.clone());
        block_on(async {
            db.set("a".to_string(), 1).await.unwrap();
            plan.arm(step);
            assert!(db.delete(&"a".to_string()).await.is_err());
            plan.disarm();
            db.recover().await.unwrap();

            let value = db.get(&"a".to_string()).await.unwrap();
            assert!(value == Some(1) || value.is_none(), "step {}: {:?}", step, value);
        });
    }
}

#[test]
fn test_crash_on_first_write_to_empty_db() {
    let steps = count_steps(false, &Write::Set("b", 5));
    for step in 1..=steps {
        let plan = Arc::new(CrashPlan::new());
        let db = test_db(plan.clone());
        block_on(async {
            plan.arm(step);
            assert!(db.set("b".to_string(), 5).await.is_err());
            plan.disarm();
            db.recover().await.unwrap();
            let value = db.get(&"b".to_string()).await.unwrap();
            assert!(value.is_none() || value == Some(5), "step {}: {:?}", step, value);
        });
    }
}

// ---------------------------------------------------------------------------
// Concurrent readers
// ---------------------------------------------------------------------------

#[test]
fn test_concurrent_reader_never_sees_damage() {
    init_tracing();
    let db = test_db(Arc::new(Yielding));
    let key = "k".to_string();
    let done = AtomicBool::new(false);

    let writer = async {
        for value in 1..=10 {
            db.set(key.clone(), value).await.unwrap();
        }
        done.store(true, Ordering::SeqCst);
    };

    let reader = async {
        let mut observed = Vec::new();
        let mut contended = 0;
        while !done.load(Ordering::SeqCst) {
            match db.get(&key).await {
                Ok(value) => observed.push(value),
                Err(FaultError::Contended { .. }) => contended += 1,
                Err(err) => panic!("unexpected read error: {}", err),
            }
        }
        observed.push(db.get(&key).await.unwrap());
        (observed, contended)
    };

    let ((), (observed, _contended)) = block_on(async { futures::join!(writer, reader) });

    assert_eq!(observed.last(), Some(&Some(10)));
    let values: Vec<i64> = observed.iter().map(|v| v.unwrap_or(0)).collect();
    assert!(values.iter().all(|v| (0..=10).contains(v)), "observed {:?}", values);
    assert!(values.windows(2).all(|w| w[0] <= w[1]), "reads went backwards: {:?}", values);
}

#[test]
fn test_raw_map_reader_sees_torn_states() {
    let map = FaultMap::new(ops(), Arc::new(Yielding));
    map.seed(1u32, 1);

    let next = 2;
    let writer = map.set(1, &next);
    let reader = async {
        let mut seen = Vec::new();
        for _ in 0..8 {
            seen.push(map.snapshot().get(&1).copied());
            Yielding.interrupt().await.unwrap();
        }
        seen
    };

    let (written, seen) = block_on(async { futures::join!(writer, reader) });
    written.unwrap();
    assert!(seen.contains(&None), "{:?}", seen);
    assert!(seen.contains(&Some(DAMAGED)), "{:?}", seen);
    assert_eq!(seen.last(), Some(&Some(2)));
}

#[test]
fn test_reads_contend_while_recovery_pending() {
    let plan = Arc::new(CrashPlan::new());
    let db = UnstableDb::new(ops(), plan.clone(), DbConfig { max_read_attempts: 3 }).unwrap();
    block_on(async {
        db.set("a".to_string(), 1).await.unwrap();
        // 6 reads, 4 for the change record, then 2 into the unstable counter
        plan.arm(12);
        assert!(db.set("a".to_string(), 2).await.is_err());
        plan.disarm();

        // unstable counter is gone until recovery restores it
        let err = db.get(&"a".to_string()).await.unwrap_err();
        assert_eq!(err, FaultError::Contended { attempts: 3 });
        assert_eq!(db.recover().await.unwrap(), RecoveryOutcome::RolledBack { seq: 2 });
        assert_eq!(db.get(&"a".to_string()).await.unwrap(), Some(1));
        assert_eq!(db.change_seqs(), vec![1]);
    });
}

#[test]
fn test_crash_while_reader_is_active() {
    let plan = Arc::new(CrashPlan::yielding());
    let db = test_db(plan.clone());
    let key = "a".to_string();
    block_on(db.set(key.clone(), 1)).unwrap();

    // steps are shared with the reader, so the crash lands mid-write
    plan.arm(30);
    let writer = db.set(key.clone(), 2);
    let reader = async {
        let mut seen = Vec::new();
        loop {
            match db.get(&key).await {
                Ok(value) => seen.push(value),
                Err(FaultError::Interrupted(_)) => break,
                Err(FaultError::Contended { .. }) => {}
                Err(err) => panic!("unexpected read error: {}", err),
            }
        }
        seen
    };
    let (_, seen) = block_on(async { futures::join!(writer, reader) });
    assert!(plan.has_crashed());
    assert!(seen.iter().all(|v| *v == Some(1) || *v == Some(2)), "{:?}", seen);

    plan.disarm();
    block_on(db.recover()).unwrap();
    let value = block_on(db.get(&key)).unwrap();
    assert!(value == Some(1) || value == Some(2));
    assert!(db.data().snapshot().values().all(|v| *v != DAMAGED));
}

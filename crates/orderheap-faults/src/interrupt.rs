//! Interrupt points
//!
//! Every fault-map phase boundary awaits `Interrupt::interrupt()`. The plan
//! behind it decides what happens there: nothing, a yield back to the
//! executor so that joined futures interleave, or a simulated crash.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::Poll;

use futures::future::{self, BoxFuture, FutureExt};
use tracing::debug;

use crate::error::Interrupted;

/// Suspension point between the phases of a fault-map operation.
pub trait Interrupt: Send + Sync {
    fn interrupt(&self) -> BoxFuture<'_, Result<(), Interrupted>>;
}

/// Give the executor one chance to poll something else.
pub(crate) async fn yield_now() {
    let mut yielded = false;
    future::poll_fn(|cx| {
        if yielded {
            Poll::Ready(())
        } else {
            yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    })
    .await
}

/// Always ready, never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uninterrupted;

impl Interrupt for Uninterrupted {
    fn interrupt(&self) -> BoxFuture<'_, Result<(), Interrupted>> {
        future::ready(Ok(())).boxed()
    }
}

/// Yields once at every step so concurrent readers observe each phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct Yielding;

impl Interrupt for Yielding {
    fn interrupt(&self) -> BoxFuture<'_, Result<(), Interrupted>> {
        async {
            yield_now().await;
            Ok(())
        }
        .boxed()
    }
}

/// Counts steps and crashes at an armed one.
///
/// Once the armed step fires, every later step fails too, the way a dead
/// process stays dead, until `disarm` is called for the recovery phase.
#[derive(Debug, Default)]
pub struct CrashPlan {
    steps: AtomicU64,
    /// Absolute step to crash at, 0 when disarmed
    armed: AtomicU64,
    crashed: AtomicBool,
    yielding: bool,
}

impl CrashPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Like `new`, but also yields at every step that does not crash.
    pub fn yielding() -> Self {
        Self { yielding: true, ..Self::default() }
    }

    /// Crash at the `n`-th step from now (`n >= 1`).
    pub fn arm(&self, n: u64) {
        let at = self.steps.load(Ordering::SeqCst) + n.max(1);
        self.armed.store(at, Ordering::SeqCst);
    }

    pub fn disarm(&self) {
        self.armed.store(0, Ordering::SeqCst);
        self.crashed.store(false, Ordering::SeqCst);
    }

    /// Steps counted so far.
    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::SeqCst)
    }

    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    /// Count one step synchronously. Used by stores that have no await points.
    pub fn tick(&self) -> Result<(), Interrupted> {
        let step = self.steps.fetch_add(1, Ordering::SeqCst) + 1;
        if self.crashed.load(Ordering::SeqCst) {
            return Err(Interrupted { step });
        }
        if self.armed.load(Ordering::SeqCst) == step {
            self.crashed.store(true, Ordering::SeqCst);
            debug!(step, "crash injected");
            return Err(Interrupted { step });
        }
        Ok(())
    }
}

impl Interrupt for CrashPlan {
    fn interrupt(&self) -> BoxFuture<'_, Result<(), Interrupted>> {
        let outcome = self.tick();
        let yielding = self.yielding && outcome.is_ok();
        async move {
            if yielding {
                yield_now().await;
            }
            outcome
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn test_crash_fires_at_armed_step_and_sticks() {
        let plan = CrashPlan::new();
        block_on(plan.interrupt()).unwrap();
        plan.arm(2);
        assert!(block_on(plan.interrupt()).is_ok());
        assert_eq!(block_on(plan.interrupt()), Err(Interrupted { step: 3 }));
        assert!(plan.has_crashed());
        assert_eq!(plan.tick(), Err(Interrupted { step: 4 }));

        plan.disarm();
        assert!(plan.tick().is_ok());
        assert_eq!(plan.steps(), 5);
    }

    #[test]
    fn test_yielding_lets_joined_futures_interleave() {
        let log = parking_lot::Mutex::new(Vec::new());
        let order = &log;
        let run = move |name: &'static str| async move {
            for _ in 0..2 {
                order.lock().push(name);
                Yielding.interrupt().await.unwrap();
            }
        };
        block_on(async { futures::join!(run("a"), run("b")) });
        assert_eq!(*log.lock(), vec!["a", "b", "a", "b"]);
    }
}

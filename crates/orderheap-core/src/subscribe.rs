//! Publish/subscribe registry for change notifications.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use hashbrown::HashMap;
use parking_lot::Mutex;

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E: ?Sized> {
    next_id: AtomicU64,
    callbacks: Mutex<HashMap<u64, Callback<E>>>,
}

/// Callbacks invoked synchronously on every published event.
pub struct Subscribers<E: ?Sized> {
    registry: Arc<Registry<E>>,
}

impl<E: ?Sized + 'static> Subscribers<E> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(1),
                callbacks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register `callback`; it runs until the returned handle unsubscribes.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.callbacks.lock().insert(id, Arc::new(callback));

        let registry: Weak<Registry<E>> = Arc::downgrade(&self.registry);
        Subscription {
            id,
            cancel: Some(Box::new(move |id| {
                if let Some(registry) = registry.upgrade() {
                    registry.callbacks.lock().remove(&id);
                }
            })),
        }
    }

    /// Invoke every registered callback with `event`.
    ///
    /// The registry lock is released before any callback runs, so callbacks
    /// may subscribe or unsubscribe; such changes apply from the next publish.
    pub fn publish(&self, event: &E) {
        let callbacks: Vec<Callback<E>> = self.registry.callbacks.lock().values().cloned().collect();
        for callback in callbacks {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.registry.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: ?Sized + 'static> Default for Subscribers<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by `subscribe`. Dropping it keeps the callback registered.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    cancel: Option<Box<dyn FnOnce(u64) + Send + Sync>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

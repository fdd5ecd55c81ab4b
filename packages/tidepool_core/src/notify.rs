//! Process-local change notifications. Subscribers are plain callbacks run
//! synchronously when conversation state changes; a host uses this to push
//! sidebar refreshes over whatever transport it has. Nothing is persisted
//! and nothing crosses process boundaries.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

type Callback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct ChangeNotifier {
    inner: Arc<Mutex<Registry>>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: Vec<(u64, Callback)>,
}

impl Registry {
    fn lock(inner: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
        // A poisoned registry only means a subscriber panicked mid-publish;
        // the subscriber list itself is still consistent.
        inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. It stays registered until the returned handle is
    /// dropped or explicitly unsubscribed.
    pub fn subscribe(&self, callback: impl Fn() + Send + Sync + 'static) -> Subscription {
        let mut registry = Registry::lock(&self.inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.push((id, Arc::new(callback)));
        Subscription {
            registry: Arc::clone(&self.inner),
            id,
        }
    }

    /// Invoke every current subscriber, in registration order. A panicking
    /// subscriber is logged and skipped; the rest still run.
    pub fn publish(&self) {
        let callbacks: Vec<Callback> = Registry::lock(&self.inner)
            .subscribers
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                warn!("Change subscriber panicked; continuing with remaining subscribers");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        Registry::lock(&self.inner).subscribers.len()
    }
}

/// RAII handle for a registered callback. Dropping it unsubscribes.
pub struct Subscription {
    registry: Arc<Mutex<Registry>>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        Registry::lock(&self.registry)
            .subscribers
            .retain(|(id, _)| *id != self.id);
    }
}

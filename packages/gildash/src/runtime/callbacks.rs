//! Index-run callback registry
//!
//! Owns the boxed `on_indexed` callbacks independently of any coordinator
//! instance, so promotion can hand the same set to a newly built
//! coordinator. Dispatch snapshots the list first: subscribers added during
//! a run do not observe that run, and unsubscribing mid-dispatch does not
//! affect the in-flight calls.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::features::indexing::coordinator::IndexResult;

type Callback = Arc<dyn Fn(&IndexResult) + Send + Sync>;

#[derive(Default)]
pub struct CallbackRegistry {
    entries: Mutex<Vec<(u64, Callback)>>,
    next_id: AtomicU64,
}

impl CallbackRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a callback; the handle unsubscribes it.
    pub fn subscribe(self: &Arc<Self>, callback: Callback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push((id, callback));
        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    /// Call every currently registered callback with `result`.
    pub fn dispatch(&self, result: &IndexResult) {
        let snapshot: Vec<Callback> = self
            .entries
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in snapshot {
            callback(result);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn remove(&self, id: u64) {
        self.entries.lock().retain(|(entry_id, _)| *entry_id != id);
    }
}

/// Unsubscribe handle. Idempotent; dropping it does NOT unsubscribe.
pub struct Subscription {
    id: u64,
    registry: Weak<CallbackRegistry>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::indexing::coordinator::IndexResult;
    use std::sync::atomic::AtomicUsize;

    fn result() -> IndexResult {
        IndexResult::default()
    }

    #[test]
    fn dispatch_reaches_every_subscriber() {
        let registry = CallbackRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let count = Arc::clone(&count);
            registry.subscribe(Arc::new(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }
        registry.dispatch(&result());
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let registry = CallbackRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let subscription = {
            let count = Arc::clone(&count);
            registry.subscribe(Arc::new(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            }))
        };
        subscription.unsubscribe();
        subscription.unsubscribe();
        registry.dispatch(&result());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn subscribers_added_during_dispatch_miss_that_run() {
        let registry = CallbackRegistry::new();
        let late_calls = Arc::new(AtomicUsize::new(0));
        {
            let registry_inner = Arc::clone(&registry);
            let late_calls = Arc::clone(&late_calls);
            registry.subscribe(Arc::new(move |_| {
                let late_calls = Arc::clone(&late_calls);
                registry_inner.subscribe(Arc::new(move |_| {
                    late_calls.fetch_add(1, Ordering::SeqCst);
                }));
            }));
        }
        registry.dispatch(&result());
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        // The late subscriber does observe the next run
        registry.dispatch(&result());
        assert!(late_calls.load(Ordering::SeqCst) >= 1);
    }
}

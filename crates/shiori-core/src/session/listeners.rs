//! Callbacks notified when the session is permanently invalid.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, Weak};

type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// Set of session-invalidation listeners owned by one client.
#[derive(Clone, Default)]
pub struct InvalidationListeners {
    registry: Arc<Mutex<Registry>>,
}

impl InvalidationListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener. Dropping the handle keeps the listener registered;
    /// call [`ListenerHandle::unregister`] to remove it.
    pub fn register<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.push((id, Arc::new(listener)));

        ListenerHandle {
            registry: Arc::downgrade(&self.registry),
            id,
        }
    }

    pub fn len(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes every listener in registration order.
    ///
    /// Listeners run outside the lock, so they may register or unregister.
    /// A panicking listener is logged and skipped. Returns the number of
    /// listeners that completed normally.
    pub fn notify(&self) -> usize {
        let snapshot: Vec<Listener> = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        let mut completed = 0;
        for listener in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| listener())) {
                Ok(()) => completed += 1,
                Err(_) => tracing::error!("session invalidation listener panicked"),
            }
        }
        completed
    }
}

/// Registration handle returned by [`InvalidationListeners::register`].
#[derive(Debug)]
pub struct ListenerHandle {
    registry: Weak<Mutex<Registry>>,
    id: u64,
}

impl ListenerHandle {
    /// Removes the listener. No-op if the owning client is gone.
    pub fn unregister(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entries
                .retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_notify_calls_every_listener_once() {
        let listeners = InvalidationListeners::new();
        let (first, a) = counter();
        let (second, b) = counter();
        listeners.register(a);
        listeners.register(b);

        assert_eq!(listeners.notify(), 2);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_notify_runs_in_registration_order() {
        let listeners = InvalidationListeners::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            listeners.register(move || order.lock().unwrap().push(name));
        }

        listeners.notify();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let listeners = InvalidationListeners::new();
        let (after, b) = counter();
        listeners.register(|| panic!("listener failure"));
        listeners.register(b);

        assert_eq!(listeners.notify(), 1);
        assert_eq!(after.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_removes_only_that_listener() {
        let listeners = InvalidationListeners::new();
        let (removed, a) = counter();
        let (kept, b) = counter();
        let handle = listeners.register(a);
        listeners.register(b);

        handle.unregister();
        assert_eq!(listeners.len(), 1);

        listeners.notify();
        assert_eq!(removed.load(Ordering::SeqCst), 0);
        assert_eq!(kept.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_may_unregister_during_notify() {
        let listeners = InvalidationListeners::new();
        let slot: Arc<Mutex<Option<ListenerHandle>>> = Arc::new(Mutex::new(None));
        let inner = Arc::clone(&slot);
        let handle = listeners.register(move || {
            if let Some(handle) = inner.lock().unwrap().take() {
                handle.unregister();
            }
        });
        *slot.lock().unwrap() = Some(handle);

        assert_eq!(listeners.notify(), 1);
        assert!(listeners.is_empty());
    }

    #[test]
    fn test_unregister_after_owner_dropped_is_noop() {
        let listeners = InvalidationListeners::new();
        let handle = listeners.register(|| {});
        drop(listeners);
        handle.unregister();
    }
}

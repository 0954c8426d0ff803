//! Event listener registry.
//!
//! Every entry keeps the callback the caller registered (the original) next
//! to the callback actually invoked (the wrapped one). Removal looks entries
//! up by the original's identity, so a wrapper never has to be rebuilt to be
//! removed.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{error, trace};

/// Untyped listener receiving the raw event payload.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Listener receiving a decoded payload.
pub type TypedListener<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Identity of a registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerKey(usize);

/// Identity of the allocation behind `callback`.
pub fn listener_key<T: ?Sized>(callback: &Arc<T>) -> ListenerKey {
    ListenerKey(Arc::as_ptr(callback) as *const () as usize)
}

struct ListenerEntry {
    key: ListenerKey,
    // Holds the original allocation so its address cannot be reused while
    // the entry exists.
    _original: Box<dyn Any + Send + Sync>,
    wrapped: Listener,
}

/// Maps event names to listeners, invoked in registration order.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<HashMap<String, Vec<ListenerEntry>>>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a raw listener.
    pub fn add(&self, event: &str, callback: Listener) {
        let key = listener_key(&callback);
        self.insert(event, key, Box::new(Arc::clone(&callback)), callback);
    }

    /// Register `wrapped`, removable later through `original`.
    pub fn add_wrapped<T: ?Sized + Send + Sync + 'static>(
        &self,
        event: &str,
        original: &Arc<T>,
        wrapped: Listener,
    ) {
        let key = listener_key(original);
        self.insert(event, key, Box::new(Arc::clone(original)), wrapped);
    }

    fn insert(
        &self,
        event: &str,
        key: ListenerKey,
        original: Box<dyn Any + Send + Sync>,
        wrapped: Listener,
    ) {
        self.listeners
            .write()
            .entry(event.to_string())
            .or_default()
            .push(ListenerEntry {
                key,
                _original: original,
                wrapped,
            });
    }

    /// Remove every registration of `original` for `event`. Returns how many
    /// were removed; zero is not an error.
    pub fn remove<T: ?Sized>(&self, event: &str, original: &Arc<T>) -> usize {
        let key = listener_key(original);
        let mut listeners = self.listeners.write();

        let Some(entries) = listeners.get_mut(event) else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|entry| entry.key != key);
        let removed = before - entries.len();

        if entries.is_empty() {
            listeners.remove(event);
        }
        removed
    }

    /// Number of listeners for `event`.
    pub fn count(&self, event: &str) -> usize {
        self.listeners.read().get(event).map_or(0, Vec::len)
    }

    /// Invoke every listener for `event` once, in registration order.
    ///
    /// The listener list is snapshotted first, so listeners may add or
    /// remove listeners. A panicking listener is logged and skipped.
    pub fn dispatch(&self, event: &str, payload: &Value) -> usize {
        let snapshot: Vec<Listener> = self
            .listeners
            .read()
            .get(event)
            .map(|entries| entries.iter().map(|e| Arc::clone(&e.wrapped)).collect())
            .unwrap_or_default();

        trace!(event, listeners = snapshot.len(), "Dispatching event");

        for listener in &snapshot {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(payload))).is_err() {
                error!(event, "Listener panicked");
            }
        }

        snapshot.len()
    }
}

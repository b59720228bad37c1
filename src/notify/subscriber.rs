//! Per-field subscriber bookkeeping.

use crate::core::Value;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Observer invoked with a field's new value.
///
/// Callbacks compare by identity: clones of one `Callback` are the same
/// observer, while two callbacks wrapping identical closures are distinct.
///
/// # Examples
///
/// ```rust
/// use reactive_config::notify::Callback;
///
/// let callback = Callback::new(|value| println!("changed to {:?}", value));
/// assert_eq!(callback, callback.clone());
/// assert_ne!(callback, Callback::new(|_| {}));
/// ```
#[derive(Clone)]
pub struct Callback {
    func: Arc<dyn Fn(&Value) + Send + Sync>,
}

impl Callback {
    /// Wrap a closure.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
        }
    }

    /// Run the callback, containing any panic.
    ///
    /// Returns false if the callback panicked.
    pub(crate) fn invoke(&self, field: &str, value: &Value) -> bool {
        let outcome = catch_unwind(AssertUnwindSafe(|| (self.func)(value)));
        if outcome.is_err() {
            tracing::error!(field, "subscriber panicked while handling a change notification");
        }
        outcome.is_ok()
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.func) as *const ()
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for Callback {}

impl Hash for Callback {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:p})", self.addr())
    }
}

/// Registry mapping field names to the callbacks subscribed to them.
///
/// The owning model checks that field names are declared before calling in;
/// this type only keeps the sets.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscribers: HashMap<String, Vec<Callback>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `callback` to `field`.
    ///
    /// Returns false if it was already registered, leaving the registry unchanged.
    pub fn add(&mut self, field: &str, callback: Callback) -> bool {
        let callbacks = self.subscribers.entry(field.to_string()).or_default();
        if callbacks.contains(&callback) {
            return false;
        }
        callbacks.push(callback);
        true
    }

    /// Remove `callback` from `field`.
    ///
    /// Returns false if it was not registered.
    pub fn remove(&mut self, field: &str, callback: &Callback) -> bool {
        let Some(callbacks) = self.subscribers.get_mut(field) else {
            return false;
        };
        let before = callbacks.len();
        callbacks.retain(|existing| existing != callback);
        let removed = callbacks.len() != before;
        if callbacks.is_empty() {
            self.subscribers.remove(field);
        }
        removed
    }

    /// Returns true if `callback` is registered for `field`.
    pub fn contains(&self, field: &str, callback: &Callback) -> bool {
        self.subscribers
            .get(field)
            .is_some_and(|callbacks| callbacks.contains(callback))
    }

    /// Copy of the callbacks for `field`, so they can run without the registry borrowed.
    pub fn snapshot(&self, field: &str) -> Vec<Callback> {
        self.subscribers.get(field).cloned().unwrap_or_default()
    }

    /// Number of callbacks registered for `field`.
    pub fn subscriber_count(&self, field: &str) -> usize {
        self.subscribers.get(field).map_or(0, Vec::len)
    }

    /// Fields with at least one subscriber.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.subscribers.keys().map(String::as_str)
    }

    /// Returns true if nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

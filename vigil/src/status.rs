//! Conversation-scoped persistent status storage.
//!
//! The reconciler persists the latest resolved delivered/read message id per
//! conversation so status survives reloads without re-deriving. Any
//! key-value backend works; the trait is deliberately minimal.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Key under which the delivered message id for a conversation is stored.
#[must_use]
pub fn delivered_key(conversation_id: &str) -> String {
    format!("delivered-{conversation_id}")
}

/// Key under which the read message id for a conversation is stored.
#[must_use]
pub fn read_key(conversation_id: &str) -> String {
    format!("read-{conversation_id}")
}

/// Conversation-scoped get/set storage used by the reconciler.
pub trait StatusStore: Send + Sync {
    /// Returns the stored value for a key, if any.
    fn get(&self, key: &str) -> Option<String>;
    /// Stores a value under a key, replacing any previous value.
    fn set(&self, key: &str, value: &str);
    /// Removes a key.
    fn remove(&self, key: &str);
}

impl<S: StatusStore + ?Sized> StatusStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) {
        (**self).set(key, value);
    }

    fn remove(&self, key: &str) {
        (**self).remove(key);
    }
}

/// In-memory [`StatusStore`] for tests and single-session use.
#[derive(Default)]
pub struct InMemoryStatusStore {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryStatusStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusStore for InMemoryStatusStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

//! Concurrent LIFO of created object names

use std::sync::Mutex;

/// Remembers the names of successfully created objects so churn workloads can
/// delete them again.
///
/// LIFO ordering maximises the chance a popped name still exists on the
/// server (most recent first). The cache tracks server state only
/// approximately: there is no reconciliation and no TTL.
#[derive(Debug, Default)]
pub struct NameCache {
    entries: Mutex<Vec<String>>,
}

impl NameCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a name; never blocks beyond the internal lock.
    pub fn push(&self, name: String) {
        self.lock().push(name);
    }

    /// Pop the most recently pushed name, `None` when empty.
    pub fn pop(&self) -> Option<String> {
        self.lock().pop()
    }

    /// Number of cached names.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

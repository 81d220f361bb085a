//! Credential-id keyed cache with per-entry expiry.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

struct Entry<T> {
    value: T,
    expires_at: Option<Instant>,
}

impl<T> Entry<T> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Values expire after their TTL; entries without a TTL live until removed.
pub struct ClientCache<T> {
    entries: DashMap<String, Entry<T>>,
}

impl<T: Clone> ClientCache<T> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Unexpired value for `key`; an expired entry is evicted.
    pub fn get(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    pub fn insert(&self, key: impl Into<String>, value: T, ttl: Option<Duration>) {
        // A TTL beyond the clock's range never expires
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        self.entries.insert(key.into(), Entry { value, expires_at });
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Clone> Default for ClientCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

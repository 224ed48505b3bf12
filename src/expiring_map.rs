//! Self-expiring map
//!
//! A key-value cache where every write stamps an expiry. Eviction is lazy: expired entries are
//! dropped when they are touched, and writes purge whatever has expired so far. There is no
//! sweeper thread.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::clock::Clock;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: u64,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// TTL map with access-time eviction, guarded by a single lock.
pub struct SelfExpiringMap<K, V> {
    ttl_ms: u64,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K, V> fmt::Debug for SelfExpiringMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelfExpiringMap")
            .field("ttl_ms", &self.ttl_ms)
            .finish_non_exhaustive()
    }
}

impl<K, V> SelfExpiringMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create an empty map whose entries live for `ttl_ms` after their last write or read.
    pub fn new(ttl_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl_ms,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the value for `key` and renews its expiry.
    ///
    /// An expired entry is removed and reported as absent.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.millis();
        let mut entries = self.lock();
        match entries.get_mut(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => {
                entry.expires_at = now.saturating_add(self.ttl_ms);
                Some(entry.value.clone())
            }
            None => None,
        }
    }

    /// Inserts or replaces `key`, resetting its TTL. Returns the previous live value.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        let now = self.clock.millis();
        let mut entries = self.lock();
        entries.retain(|_, entry| !entry.is_expired(now));
        entries
            .insert(
                key,
                Entry {
                    value,
                    expires_at: now.saturating_add(self.ttl_ms),
                },
            )
            .map(|previous| previous.value)
    }

    /// Returns the live value for `key` without renewing it.
    pub fn peek(&self, key: &K) -> Option<V> {
        let now = self.clock.millis();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Whether a live entry exists for `key`. Does not renew the entry.
    pub fn contains_key(&self, key: &K) -> bool {
        self.peek(key).is_some()
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let now = self.clock.millis();
        self.lock()
            .remove(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of live entries. Purges expired ones.
    pub fn len(&self) -> usize {
        let now = self.clock.millis();
        let mut entries = self.lock();
        entries.retain(|_, entry| !entry.is_expired(now));
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

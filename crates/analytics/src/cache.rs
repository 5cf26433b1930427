//! Fixed-TTL key-value cache shared between request handlers
//!
//! Entries expire `ttl` after they were written and are only replaced by the
//! next `insert`; there is no background eviction. Concurrent writers race
//! and the last write wins.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    /// `None` when `now + ttl` does not fit in an `Instant`
    expires_at: Option<Instant>,
}

pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, Entry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value, if present and not yet expired
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|e| e.expires_at.map_or(true, |at| now < at))
            .map(|e| e.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    fn insert_at(&self, key: K, value: V, now: Instant) {
        let entry = Entry {
            value,
            expires_at: now.checked_add(self.ttl),
        };
        self.entries.write().insert(key, entry);
    }

    /// Drop one entry. Returns true if something was cached under `key`.
    pub fn invalidate(&self, key: &K) -> bool {
        self.entries.write().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

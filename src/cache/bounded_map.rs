// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded cache map with combined LRU and max-age eviction.
//!
//! ```text
//!   front (least recent)                         back (most recent)
//!   ┌──────┬──────┬──────┬──────┐
//!   │  k2  │  k3  │  k4  │  k1  │   ← get(k1) moved k1 to the back
//!   └──────┴──────┴──────┴──────┘
//!      ▲
//!      └── evicted first when a new key would exceed capacity
//! ```
//!
//! Expiration is lazy: there is no clock thread. Expired entries are purged on
//! every `put` and dropped when a `get` finds them. Age counts from creation
//! or replacement, never from the last read.

use std::hash::Hash;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;

struct Entry<V> {
    value: V,
    created: Instant,
}

impl<V> Entry<V> {
    fn is_expired(&self, max_age: Duration, now: Instant) -> bool {
        now.duration_since(self.created) >= max_age
    }
}

/// Thread-safe map bounded by entry count and entry age.
///
/// # Example
///
/// ```
/// use directory_cache::cache::BoundedCacheMap;
/// use std::time::Duration;
///
/// let cache = BoundedCacheMap::new(2, Duration::from_secs(60));
/// cache.put("a", 1);
/// cache.put("b", 2);
/// cache.get(&"a");          // "a" is now most recent
/// cache.put("c", 3);        // evicts "b"
/// assert_eq!(cache.keys(), vec!["a", "c"]);
/// ```
pub struct BoundedCacheMap<K, V> {
    entries: Mutex<IndexMap<K, Entry<V>>>,
    capacity: usize,
    max_age: Duration,
}

impl<K, V> BoundedCacheMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        Self {
            entries: Mutex::new(IndexMap::with_capacity(capacity.min(1024))),
            capacity,
            max_age,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Insert or replace. A replaced key becomes most recent and its age resets.
    pub fn put(&self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        let now = Instant::now();
        let max_age = self.max_age;
        let mut entries = self.entries.lock();

        entries.retain(|_, entry| !entry.is_expired(max_age, now));

        // Re-inserting at the back is what moves an existing key to MRU.
        let replacing = entries.shift_remove(&key).is_some();
        if !replacing {
            while entries.len() >= self.capacity {
                entries.shift_remove_index(0);
            }
        }
        entries.insert(key, Entry { value, created: now });
    }

    /// Look up a live entry and promote it to most recent.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let index = entries.get_index_of(key)?;
        if entries[index].is_expired(self.max_age, now) {
            entries.shift_remove_index(index);
            return None;
        }
        let last = entries.len() - 1;
        entries.move_index(index, last);
        Some(entries[last].value.clone())
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.lock().shift_remove(key).map(|entry| entry.value)
    }

    /// Keys from least to most recently used, expired entries included until purged.
    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Drop every entry whose key fails the predicate.
    pub fn retain(&self, mut keep: impl FnMut(&K) -> bool) {
        self.entries.lock().retain(|key, _| keep(key));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

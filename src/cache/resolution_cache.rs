// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resolution Cache
//!
//! Memoizes derived lookups (nested-group closures) with generation-based
//! invalidation. Every committed write bumps the store generation, so an
//! entry cached under an older generation is automatically stale.
//!
//! # Flow
//!
//! ```text
//! Resolution request arrives
//!       │
//!       ▼
//! ┌─────────────────────────────┐
//! │  Cache lookup               │
//! │  check: cached_generation   │
//! │         == current?         │
//! └─────────────────────────────┘
//!       │
//!       ├─→ Hit + generation matches → return cached value
//!       │
//!       └─→ Miss OR stale → run SQL, cache result
//! ```

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::BoundedCacheMap;
use crate::metrics;

/// Bounded memo whose entries are only valid for the generation they were computed at
pub struct ResolutionCache<K, V> {
    /// Cache name used as a metrics label
    name: &'static str,
    entries: BoundedCacheMap<K, (u64, V)>,
    hits: AtomicU64,
    misses: AtomicU64,
    /// Entries discarded because the generation moved on
    stale: AtomicU64,
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct ResolutionCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stale: u64,
    pub entry_count: usize,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

impl<K, V> ResolutionCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(name: &'static str, max_entries: usize, max_age: Duration) -> Self {
        Self {
            name,
            entries: BoundedCacheMap::new(max_entries, max_age),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stale: AtomicU64::new(0),
        }
    }

    /// Returns the cached value if it was computed at `generation`.
    pub fn get(&self, key: &K, generation: u64) -> Option<V> {
        if let Some((cached_generation, value)) = self.entries.get(key) {
            if cached_generation == generation {
                self.hits.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_lookup(self.name, "hit");
                return Some(value);
            }
            self.stale.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_lookup(self.name, "stale");
            self.entries.remove(key);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_lookup(self.name, "miss");
        None
    }

    pub fn insert(&self, key: K, generation: u64, value: V) {
        self.entries.put(key, (generation, value));
        metrics::set_cache_entries(self.name, self.entries.len());
    }

    pub fn stats(&self) -> ResolutionCacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        ResolutionCacheStats {
            hits,
            misses,
            stale: self.stale.load(Ordering::Relaxed),
            entry_count: self.entries.len(),
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
        metrics::set_cache_entries(self.name, 0);
    }
}

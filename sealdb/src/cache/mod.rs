// /////////////////////////////////////////////////////////////////////////////
// sealdb
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Query & Cache Layer (C5)
//!
//! A generic, bounded, thread-safe LRU cache: a hash map plus a recency
//! list giving O(1) get/put/remove, protected by a single mutex whose
//! critical sections do nothing but pointer manipulation (per the
//! concurrency model). [`query_cache`] composes three instances of
//! [`BoundedCache`] -- record-by-id, equality-query-by-value,
//! range-query-by-key -- into the layer the record store consults.

pub mod query_cache;

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;

pub use query_cache::QueryCacheLayer;

/// Point-in-time statistics for one [`BoundedCache`] instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub hit_count: u64,
    pub miss_count: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

/// A bounded LRU cache with hit/miss counters. `capacity` is fixed at
/// construction; callers never observe unbounded growth.
pub struct BoundedCache<K, V> {
    capacity: usize,
    inner: Mutex<LruCache<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let nz = NonZeroUsize::new(capacity.max(1)).expect("capacity.max(1) is never zero");
        Self {
            capacity,
            inner: Mutex::new(LruCache::new(nz)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut guard = self.inner.lock();
        let found = guard.get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub fn put(&self, key: K, value: V) {
        self.inner.lock().put(key, value);
    }

    pub fn remove(&self, key: &K) {
        self.inner.lock().pop(key);
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn get_stats(&self) -> CacheStats {
        CacheStats {
            hit_count: self.hits.load(Ordering::Relaxed),
            miss_count: self.misses.load(Ordering::Relaxed),
            size: self.inner.lock().len(),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_put_remove_round_trip() {
        let cache: BoundedCache<i64, String> = BoundedCache::new(2);
        assert_eq!(cache.get(&1), None);
        cache.put(1, "one".to_string());
        assert_eq!(cache.get(&1), Some("one".to_string()));
        cache.remove(&1);
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn capacity_is_enforced_with_lru_eviction() {
        let cache: BoundedCache<i64, i64> = BoundedCache::new(2);
        cache.put(1, 1);
        cache.put(2, 2);
        cache.put(3, 3); // evicts 1 (least recently used)
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(2));
        assert_eq!(cache.get(&3), Some(3));
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let cache: BoundedCache<i64, i64> = BoundedCache::new(10);
        cache.put(1, 1);
        let _ = cache.get(&1); // hit
        let _ = cache.get(&2); // miss
        let stats = cache.get_stats();
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.size, 1);
        assert_eq!(stats.capacity, 10);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn clear_empties_the_cache_without_resetting_counters() {
        let cache: BoundedCache<i64, i64> = BoundedCache::new(10);
        cache.put(1, 1);
        let _ = cache.get(&1);
        cache.clear();
        assert_eq!(cache.get_stats().size, 0);
        assert_eq!(cache.get_stats().hit_count, 1);
    }
}

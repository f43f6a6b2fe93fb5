// /////////////////////////////////////////////////////////////////////////////
// sealdb
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Composition of the three bounded caches the record store consults:
//! record-by-id, equality-query-by-value, and range-query-by-key. The
//! invalidation policy is deliberately coarse -- any successful mutation on
//! the record store clears both query caches in full, since per-value
//! invalidation would require server-side knowledge of plaintext indices.

use sealdb_domain::{CacheConfig, EncryptedRecord};

use super::{BoundedCache, CacheStats};

/// Canonicalizes an optional `(lo, hi)` range bound pair into a cache key.
pub fn range_key(lo: Option<u64>, hi: Option<u64>) -> String {
    format!(
        "{}..{}",
        lo.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string()),
        hi.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
    )
}

/// Snapshot of all three caches' statistics, returned by the façade's
/// `get_cache_stats`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheLayerStats {
    pub record: CacheStats,
    pub equality: CacheStats,
    pub range: CacheStats,
}

pub struct QueryCacheLayer {
    record: BoundedCache<i64, EncryptedRecord>,
    equality: BoundedCache<u64, Vec<i64>>,
    range: BoundedCache<String, Vec<i64>>,
}

impl QueryCacheLayer {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            record: BoundedCache::new(config.record_cache_capacity),
            equality: BoundedCache::new(config.equality_cache_capacity),
            range: BoundedCache::new(config.range_cache_capacity),
        }
    }

    pub fn get_record(&self, id: i64) -> Option<EncryptedRecord> {
        self.record.get(&id)
    }

    pub fn put_record(&self, record: EncryptedRecord) {
        self.record.put(record.id, record);
    }

    pub fn remove_record(&self, id: i64) {
        self.record.remove(&id);
    }

    pub fn get_equality(&self, value: u64) -> Option<Vec<i64>> {
        self.equality.get(&value)
    }

    pub fn put_equality(&self, value: u64, ids: Vec<i64>) {
        self.equality.put(value, ids);
    }

    pub fn get_range(&self, lo: Option<u64>, hi: Option<u64>) -> Option<Vec<i64>> {
        self.range.get(&range_key(lo, hi))
    }

    pub fn put_range(&self, lo: Option<u64>, hi: Option<u64>, ids: Vec<i64>) {
        self.range.put(range_key(lo, hi), ids);
    }

    /// Invalidates both query caches, per C4's mutation policy. The record
    /// cache is left untouched by this call; callers that mutate or delete
    /// a specific record evict/refresh it separately.
    pub fn invalidate_queries(&self) {
        self.equality.clear();
        self.range.clear();
    }

    /// Clears every cache. Exposed as the façade's `clear_caches`.
    pub fn clear_all(&self) {
        self.record.clear();
        self.equality.clear();
        self.range.clear();
    }

    pub fn get_stats(&self) -> CacheLayerStats {
        CacheLayerStats {
            record: self.record.get_stats(),
            equality: self.equality.get_stats(),
            range: self.range.get_stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_record(id: i64) -> EncryptedRecord {
        let now = Utc::now();
        EncryptedRecord {
            id,
            encrypted_index: vec![1, 2, 3],
            encrypted_payload: vec![4, 5, 6],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn range_key_canonicalizes_open_bounds() {
        assert_eq!(range_key(None, None), "-..-");
        assert_eq!(range_key(Some(10), None), "10..-");
        assert_eq!(range_key(None, Some(20)), "-..20");
        assert_eq!(range_key(Some(10), Some(20)), "10..20");
    }

    #[test]
    fn record_cache_round_trips_by_id() {
        let layer = QueryCacheLayer::new(&CacheConfig::default());
        layer.put_record(sample_record(7));
        assert_eq!(layer.get_record(7).unwrap().id, 7);
        layer.remove_record(7);
        assert_eq!(layer.get_record(7), None);
    }

    #[test]
    fn invalidate_queries_clears_equality_and_range_but_not_record() {
        let layer = QueryCacheLayer::new(&CacheConfig::default());
        layer.put_record(sample_record(1));
        layer.put_equality(42, vec![1]);
        layer.put_range(Some(0), Some(100), vec![1]);

        layer.invalidate_queries();

        assert_eq!(layer.get_equality(42), None);
        assert_eq!(layer.get_range(Some(0), Some(100)), None);
        assert!(layer.get_record(1).is_some());
    }
}

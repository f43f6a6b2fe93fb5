// /////////////////////////////////////////////////////////////////////////////
// sealdb
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Record Store (C4)
//!
//! Relational storage of encrypted records, their content-addressed
//! dedup bookkeeping, and their optional range-query bit ciphertexts. All
//! multi-statement mutations run inside a single `sqlx` transaction; on any
//! failure the transaction rolls back (dropping an uncommitted
//! [`sqlx::Transaction`] rolls it back automatically) and the in-memory
//! caches are left untouched.

mod dedup;
mod schema;

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;

use chrono::Utc;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use sealdb_domain::{CacheConfig, EncryptedRecord, NewRecord, SealError, SealResult, StoreConfig};

use crate::cache::QueryCacheLayer;
use crate::fhe::Engine;

pub use crate::cache::query_cache::CacheLayerStats;

/// Relational storage engine for encrypted records. Owns the SQL
/// connection pool and the query/cache layer (C5); predicate scans take
/// the homomorphic index engine (C3) as an explicit parameter rather than
/// owning it, since a single engine instance is typically shared across
/// many collaborators.
pub struct RecordStore {
    pool: SqlitePool,
    #[allow(dead_code)] // query_timeout_secs governs a caller-side timeout wrapper, not applied inside this module
    config: StoreConfig,
    caches: QueryCacheLayer,
    reference_cache: StdMutex<HashMap<String, i64>>,
}

impl RecordStore {
    /// Connects to `database_url` (an sqlx SQLite connection string, e.g.
    /// `sqlite://path/to/db.sqlite` or `sqlite::memory:`) and ensures the
    /// schema exists.
    #[tracing::instrument(skip(cache_config))]
    pub async fn connect(database_url: &str, config: StoreConfig, cache_config: &CacheConfig) -> SealResult<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| SealError::io_fail(format!("failed to connect to {database_url}: {e}")))?;
        Self::from_pool(pool, config, cache_config).await
    }

    pub async fn from_pool(pool: SqlitePool, config: StoreConfig, cache_config: &CacheConfig) -> SealResult<Self> {
        let store = Self {
            pool,
            config,
            caches: QueryCacheLayer::new(cache_config),
            reference_cache: StdMutex::new(HashMap::new()),
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> SealResult<()> {
        for statement in schema::STATEMENTS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| SealError::io_fail(format!("schema migration failed: {e}")))?;
        }
        Ok(())
    }

    /// Looks up or creates the reference-table row for `payload`'s hash,
    /// consulting the reference cache first. Runs inside the caller's
    /// transaction so it rolls back together with the rest of the mutation.
    /// Returns the `(hash, ref_id)` pair without touching `reference_cache`
    /// -- the transaction may still roll back, and a cache entry written
    /// before commit would outlive the row it names. Callers apply the
    /// returned pair to the cache only after `tx.commit()` succeeds.
    async fn ensure_reference(&self, tx: &mut Transaction<'_, Sqlite>, payload: &[u8]) -> SealResult<(String, i64)> {
        let hash = dedup::hash_hex(payload);
        if let Some(&ref_id) = self.reference_cache.lock().expect("reference cache mutex poisoned").get(&hash) {
            return Ok((hash, ref_id));
        }

        let existing = sqlx::query("SELECT id FROM reference_table WHERE hash_value = ?")
            .bind(&hash)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| SealError::io_fail(e.to_string()))?;

        let ref_id = match existing {
            Some(row) => row.get::<i64, _>("id"),
            None => sqlx::query("INSERT INTO reference_table (hash_value, encrypted_data) VALUES (?, ?)")
                .bind(&hash)
                .bind(payload)
                .execute(&mut *tx)
                .await
                .map_err(|e| SealError::io_fail(e.to_string()))?
                .last_insert_rowid(),
        };

        Ok((hash, ref_id))
    }

    async fn insert_one(&self, tx: &mut Transaction<'_, Sqlite>, record: &NewRecord) -> SealResult<(i64, String, i64)> {
        let (hash, ref_id) = self.ensure_reference(tx, &record.encrypted_payload).await?;

        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO encrypted_records (encrypted_index, encrypted_payload, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&record.encrypted_index)
        .bind(&record.encrypted_payload)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| SealError::io_fail(e.to_string()))?
        .last_insert_rowid();

        if let Some(bits) = &record.encrypted_bits {
            for (position, bit) in bits.iter().enumerate() {
                sqlx::query("INSERT INTO range_query_indices (record_id, bit_position, encrypted_bit) VALUES (?, ?, ?)")
                    .bind(id)
                    .bind(position as i64)
                    .bind(bit)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| SealError::io_fail(e.to_string()))?;
            }
        }

        Ok((id, hash, ref_id))
    }

    /// Inserts one record (plus its bit rows, if any) in a single
    /// transaction, deduplicating the payload by hash.
    #[tracing::instrument(skip(self, record))]
    pub async fn add(&self, record: NewRecord) -> SealResult<i64> {
        let mut tx = self.pool.begin().await.map_err(|e| SealError::io_fail(e.to_string()))?;
        let (id, hash, ref_id) = self.insert_one(&mut tx, &record).await?;
        tx.commit().await.map_err(|e| SealError::io_fail(e.to_string()))?;
        self.reference_cache.lock().expect("reference cache mutex poisoned").insert(hash, ref_id);
        self.caches.invalidate_queries();
        Ok(id)
    }

    /// Inserts every record in a single transaction; the returned id list
    /// preserves input order. A failure partway rolls the whole batch back
    /// and surfaces as [`SealError::Batch`], preserving the original error
    /// kind rather than collapsing it to [`SealError::Internal`].
    pub async fn add_batch(&self, records: Vec<NewRecord>) -> SealResult<Vec<i64>> {
        let attempted = records.len();
        let mut tx = self.pool.begin().await.map_err(|e| SealError::io_fail(e.to_string()))?;
        let mut ids = Vec::with_capacity(attempted);
        let mut references = Vec::with_capacity(attempted);
        for record in &records {
            match self.insert_one(&mut tx, record).await {
                Ok((id, hash, ref_id)) => {
                    ids.push(id);
                    references.push((hash, ref_id));
                }
                Err(e) => return Err(SealError::batch(attempted, e)),
            }
        }
        tx.commit().await.map_err(|e| SealError::io_fail(e.to_string()))?;

        let mut cache = self.reference_cache.lock().expect("reference cache mutex poisoned");
        for (hash, ref_id) in references {
            cache.insert(hash, ref_id);
        }
        drop(cache);
        self.caches.invalidate_queries();
        Ok(ids)
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> EncryptedRecord {
        EncryptedRecord {
            id: row.get("id"),
            encrypted_index: row.get("encrypted_index"),
            encrypted_payload: row.get("encrypted_payload"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    /// Cache-first lookup by id. Absence is not an error.
    pub async fn get_by_id(&self, id: i64) -> SealResult<Option<EncryptedRecord>> {
        if let Some(cached) = self.caches.get_record(id) {
            return Ok(Some(cached));
        }
        let row = sqlx::query("SELECT id, encrypted_index, encrypted_payload, created_at, updated_at FROM encrypted_records WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SealError::io_fail(e.to_string()))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let record = Self::row_to_record(&row);
        self.caches.put_record(record.clone());
        Ok(Some(record))
    }

    /// Partitions `ids` into cache hits and misses, resolving misses with a
    /// single `IN` query, and returns records in the same order as `ids`.
    /// Ids with no matching record are silently omitted.
    pub async fn get_by_ids(&self, ids: &[i64]) -> SealResult<Vec<EncryptedRecord>> {
        let mut found: HashMap<i64, EncryptedRecord> = HashMap::new();
        let mut misses = Vec::new();
        for &id in ids {
            match self.caches.get_record(id) {
                Some(record) => {
                    found.insert(id, record);
                }
                None => misses.push(id),
            }
        }

        if !misses.is_empty() {
            let placeholders = misses.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let query = format!(
                "SELECT id, encrypted_index, encrypted_payload, created_at, updated_at FROM encrypted_records WHERE id IN ({placeholders})"
            );
            let mut q = sqlx::query(&query);
            for id in &misses {
                q = q.bind(id);
            }
            let rows = q.fetch_all(&self.pool).await.map_err(|e| SealError::io_fail(e.to_string()))?;
            for row in &rows {
                let record = Self::row_to_record(row);
                self.caches.put_record(record.clone());
                found.insert(record.id, record);
            }
        }

        Ok(ids.iter().filter_map(|id| found.get(id).cloned()).collect())
    }

    /// Returns every record row, unfiltered. Used internally by the full
    /// scans in [`RecordStore::search_by_encrypted_index`] and
    /// [`RecordStore::search_by_range`], and by the façade's bulk export.
    pub(crate) async fn all_records(&self) -> SealResult<Vec<EncryptedRecord>> {
        let rows = sqlx::query("SELECT id, encrypted_index, encrypted_payload, created_at, updated_at FROM encrypted_records")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SealError::io_fail(e.to_string()))?;
        Ok(rows.iter().map(Self::row_to_record).collect())
    }

    /// Full-scan equality predicate: C4 cannot index a homomorphic
    /// ciphertext, so every row is compared via C3's `compare_encrypted`.
    /// Matching ids are cached for subsequent identical queries.
    #[tracing::instrument(skip(self, fhe))]
    pub async fn search_by_encrypted_index(&self, fhe: &Engine, v: u64) -> SealResult<Vec<EncryptedRecord>> {
        if let Some(ids) = self.caches.get_equality(v) {
            return self.get_by_ids(&ids).await;
        }

        let mut matches = Vec::new();
        for record in self.all_records().await? {
            if fhe.compare_encrypted(&record.encrypted_index, v)? {
                matches.push(record);
            }
        }

        let ids: Vec<i64> = matches.iter().map(|r| r.id).collect();
        self.caches.put_equality(v, ids);
        for record in &matches {
            self.caches.put_record(record.clone());
        }
        Ok(matches)
    }

    /// Full-scan range predicate over `range_query_indices`. Records with
    /// no bit rows (range querying was not enabled at insert time) are
    /// excluded -- a documented limitation, not a bug.
    #[tracing::instrument(skip(self, fhe))]
    pub async fn search_by_range(&self, fhe: &Engine, lo: Option<u64>, hi: Option<u64>) -> SealResult<Vec<EncryptedRecord>> {
        if let Some(ids) = self.caches.get_range(lo, hi) {
            return self.get_by_ids(&ids).await;
        }

        let mut matches = Vec::new();
        for record in self.all_records().await? {
            let bit_rows = sqlx::query("SELECT encrypted_bit FROM range_query_indices WHERE record_id = ? ORDER BY bit_position ASC")
                .bind(record.id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| SealError::io_fail(e.to_string()))?;
            if bit_rows.is_empty() {
                continue;
            }
            let bits: Vec<Vec<u8>> = bit_rows.iter().map(|row| row.get::<Vec<u8>, _>("encrypted_bit")).collect();
            if fhe.compare_range(&bits, lo, hi)? {
                matches.push(record);
            }
        }

        let ids: Vec<i64> = matches.iter().map(|r| r.id).collect();
        self.caches.put_range(lo, hi, ids);
        for record in &matches {
            self.caches.put_record(record.clone());
        }
        Ok(matches)
    }

    /// Replaces a record's payload (the index is immutable by design).
    /// Invalidates both query caches: the new payload does not change
    /// which ids match a predicate, but the cached record bodies are
    /// stale, so the coarse invalidation covers both caches per the
    /// design's deliberate simplicity trade.
    #[tracing::instrument(skip(self, new_payload))]
    pub async fn update(&self, record_id: i64, new_payload: Vec<u8>) -> SealResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| SealError::io_fail(e.to_string()))?;
        let (hash, ref_id) = self.ensure_reference(&mut tx, &new_payload).await?;

        let now = Utc::now();
        let result = sqlx::query("UPDATE encrypted_records SET encrypted_payload = ?, updated_at = ? WHERE id = ?")
            .bind(&new_payload)
            .bind(now)
            .bind(record_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| SealError::io_fail(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(SealError::not_found(format!("record {record_id}")));
        }
        tx.commit().await.map_err(|e| SealError::io_fail(e.to_string()))?;

        self.reference_cache.lock().expect("reference cache mutex poisoned").insert(hash, ref_id);
        self.caches.remove_record(record_id);
        self.caches.invalidate_queries();
        Ok(())
    }

    /// Same propagation rule as [`RecordStore::add_batch`]: a failure
    /// partway through surfaces as [`SealError::Batch`] with its original
    /// kind intact, and the reference cache is populated only after commit.
    pub async fn update_batch(&self, updates: Vec<(i64, Vec<u8>)>) -> SealResult<Vec<i64>> {
        let attempted = updates.len();
        let mut tx = self.pool.begin().await.map_err(|e| SealError::io_fail(e.to_string()))?;
        let mut updated = Vec::with_capacity(attempted);
        let mut references = Vec::with_capacity(attempted);
        for (record_id, payload) in &updates {
            let (hash, ref_id) = match self.ensure_reference(&mut tx, payload).await {
                Ok(reference) => reference,
                Err(e) => return Err(SealError::batch(attempted, e)),
            };
            let now = Utc::now();
            let result = sqlx::query("UPDATE encrypted_records SET encrypted_payload = ?, updated_at = ? WHERE id = ?")
                .bind(payload)
                .bind(now)
                .bind(record_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| SealError::batch(attempted, SealError::io_fail(e.to_string())))?;
            if result.rows_affected() == 0 {
                return Err(SealError::batch(attempted, SealError::not_found(format!("record {record_id}"))));
            }
            updated.push(*record_id);
            references.push((hash, ref_id));
        }
        tx.commit().await.map_err(|e| SealError::io_fail(e.to_string()))?;

        let mut cache = self.reference_cache.lock().expect("reference cache mutex poisoned");
        for (hash, ref_id) in references {
            cache.insert(hash, ref_id);
        }
        drop(cache);
        for id in &updated {
            self.caches.remove_record(*id);
        }
        self.caches.invalidate_queries();
        Ok(updated)
    }

    /// Cascades bit rows, removes the record, evicts it from the record
    /// cache, and invalidates both query caches.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, record_id: i64) -> SealResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| SealError::io_fail(e.to_string()))?;
        sqlx::query("DELETE FROM range_query_indices WHERE record_id = ?")
            .bind(record_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| SealError::io_fail(e.to_string()))?;
        let result = sqlx::query("DELETE FROM encrypted_records WHERE id = ?")
            .bind(record_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| SealError::io_fail(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(SealError::not_found(format!("record {record_id}")));
        }
        tx.commit().await.map_err(|e| SealError::io_fail(e.to_string()))?;

        self.caches.remove_record(record_id);
        self.caches.invalidate_queries();
        Ok(())
    }

    /// Transactional batch delete; cascades bit rows for every id.
    pub async fn delete_batch(&self, ids: &[i64]) -> SealResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| SealError::io_fail(e.to_string()))?;
        for &id in ids {
            sqlx::query("DELETE FROM range_query_indices WHERE record_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| SealError::io_fail(e.to_string()))?;
            sqlx::query("DELETE FROM encrypted_records WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| SealError::io_fail(e.to_string()))?;
        }
        tx.commit().await.map_err(|e| SealError::io_fail(e.to_string()))?;

        for &id in ids {
            self.caches.remove_record(id);
        }
        self.caches.invalidate_queries();
        Ok(())
    }

    /// Deletes every reference entry whose hash is not the hash of some
    /// live record's payload, and clears the reference cache. Idempotent.
    #[tracing::instrument(skip(self))]
    pub async fn cleanup_unused_references(&self) -> SealResult<usize> {
        let payload_rows = sqlx::query("SELECT encrypted_payload FROM encrypted_records")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SealError::io_fail(e.to_string()))?;
        let live_hashes: std::collections::HashSet<String> = payload_rows
            .iter()
            .map(|row| dedup::hash_hex(&row.get::<Vec<u8>, _>("encrypted_payload")))
            .collect();

        let hash_rows = sqlx::query("SELECT hash_value FROM reference_table")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SealError::io_fail(e.to_string()))?;

        let mut deleted = 0usize;
        for row in hash_rows {
            let hash: String = row.get("hash_value");
            if !live_hashes.contains(&hash) {
                sqlx::query("DELETE FROM reference_table WHERE hash_value = ?")
                    .bind(&hash)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| SealError::io_fail(e.to_string()))?;
                deleted += 1;
            }
        }

        self.reference_cache.lock().expect("reference cache mutex poisoned").clear();
        Ok(deleted)
    }

    /// Predicate scan followed by a batch payload update, as a single
    /// logical operation. Returns the ids actually updated.
    pub async fn update_by_index(&self, fhe: &Engine, v: u64, new_payload: Vec<u8>) -> SealResult<Vec<i64>> {
        let matches = self.search_by_encrypted_index(fhe, v).await?;
        let updates: Vec<(i64, Vec<u8>)> = matches.iter().map(|r| (r.id, new_payload.clone())).collect();
        if updates.is_empty() {
            return Ok(Vec::new());
        }
        self.update_batch(updates).await
    }

    pub async fn update_by_range(&self, fhe: &Engine, lo: Option<u64>, hi: Option<u64>, new_payload: Vec<u8>) -> SealResult<Vec<i64>> {
        let matches = self.search_by_range(fhe, lo, hi).await?;
        let updates: Vec<(i64, Vec<u8>)> = matches.iter().map(|r| (r.id, new_payload.clone())).collect();
        if updates.is_empty() {
            return Ok(Vec::new());
        }
        self.update_batch(updates).await
    }

    pub async fn delete_by_index(&self, fhe: &Engine, v: u64) -> SealResult<Vec<i64>> {
        let matches = self.search_by_encrypted_index(fhe, v).await?;
        let ids: Vec<i64> = matches.iter().map(|r| r.id).collect();
        if ids.is_empty() {
            return Ok(ids);
        }
        self.delete_batch(&ids).await?;
        Ok(ids)
    }

    pub async fn delete_by_range(&self, fhe: &Engine, lo: Option<u64>, hi: Option<u64>) -> SealResult<Vec<i64>> {
        let matches = self.search_by_range(fhe, lo, hi).await?;
        let ids: Vec<i64> = matches.iter().map(|r| r.id).collect();
        if ids.is_empty() {
            return Ok(ids);
        }
        self.delete_batch(&ids).await?;
        Ok(ids)
    }

    pub fn get_cache_stats(&self) -> CacheLayerStats {
        self.caches.get_stats()
    }

    pub fn clear_caches(&self) {
        self.caches.clear_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealdb_domain::FheParameters;

    async fn test_store() -> RecordStore {
        RecordStore::connect("sqlite::memory:", StoreConfig::default(), &CacheConfig::default())
            .await
            .unwrap()
    }

    fn test_engine() -> Engine {
        let params = FheParameters::default();
        let keys = Engine::generate_keypair(&params).unwrap();
        Engine::new_full(params, &keys.public_key, &keys.secret_key, &keys.relin_keys, &keys.galois_keys).unwrap()
    }

    #[tokio::test]
    async fn round_trip_insert_and_get() {
        let store = test_store().await;
        let record = NewRecord::new(vec![1, 2, 3], vec![4, 5, 6]);
        let id = store.add(record).await.unwrap();
        let fetched = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(fetched.encrypted_payload, vec![4, 5, 6]);
        assert_eq!(store.get_by_id(id + 1000).await.unwrap(), None);
    }

    #[tokio::test]
    async fn dedup_shares_one_reference_row_across_two_inserts() {
        let store = test_store().await;
        store.add(NewRecord::new(vec![1], vec![9, 9, 9])).await.unwrap();
        store.add(NewRecord::new(vec![2], vec![9, 9, 9])).await.unwrap();

        let count: i64 = sqlx::query("SELECT COUNT(*) AS c FROM reference_table")
            .fetch_one(&store.pool)
            .await
            .unwrap()
            .get("c");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn equality_search_finds_exact_match_only() {
        let store = test_store().await;
        let engine = test_engine();
        let idx42 = engine.encrypt_int(42).unwrap();
        let idx43 = engine.encrypt_int(43).unwrap();
        store.add(NewRecord::new(idx42, b"hello".to_vec())).await.unwrap();
        store.add(NewRecord::new(idx43, b"other".to_vec())).await.unwrap();

        let hits = store.search_by_encrypted_index(&engine, 42).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].encrypted_payload, b"hello".to_vec());

        let no_hits = store.search_by_encrypted_index(&engine, 99).await.unwrap();
        assert!(no_hits.is_empty());
    }

    #[tokio::test]
    async fn range_search_excludes_records_without_bit_rows() {
        let store = test_store().await;
        let engine = test_engine();

        let bits20 = engine.encrypt_for_range_query(20, 8).unwrap();
        let idx20 = engine.encrypt_int(20).unwrap();
        let with_range = NewRecord::new(idx20, b"ranged".to_vec()).with_range_bits(bits20);
        store.add(with_range).await.unwrap();

        let idx30 = engine.encrypt_int(30).unwrap();
        store.add(NewRecord::new(idx30, b"no-range".to_vec())).await.unwrap();

        let hits = store.search_by_range(&engine, Some(10), Some(25)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].encrypted_payload, b"ranged".to_vec());
    }

    #[tokio::test]
    async fn update_changes_payload_and_invalidates_query_caches() {
        let store = test_store().await;
        let engine = test_engine();
        let idx = engine.encrypt_int(5).unwrap();
        let id = store.add(NewRecord::new(idx, b"old".to_vec())).await.unwrap();

        store.update(id, b"new".to_vec()).await.unwrap();
        let fetched = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(fetched.encrypted_payload, b"new".to_vec());
    }

    #[tokio::test]
    async fn delete_cascades_bit_rows() {
        let store = test_store().await;
        let engine = test_engine();
        let bits = engine.encrypt_for_range_query(1, 8).unwrap();
        let idx = engine.encrypt_int(1).unwrap();
        let id = store.add(NewRecord::new(idx, b"x".to_vec()).with_range_bits(bits)).await.unwrap();

        store.delete(id).await.unwrap();
        assert_eq!(store.get_by_id(id).await.unwrap(), None);

        let remaining: i64 = sqlx::query("SELECT COUNT(*) AS c FROM range_query_indices WHERE record_id = ?")
            .bind(id)
            .fetch_one(&store.pool)
            .await
            .unwrap()
            .get("c");
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn cleanup_unused_references_removes_only_dead_entries() {
        let store = test_store().await;
        let id_a = store.add(NewRecord::new(vec![1], b"shared".to_vec())).await.unwrap();
        let id_b = store.add(NewRecord::new(vec![2], b"shared".to_vec())).await.unwrap();
        store.add(NewRecord::new(vec![3], b"unique".to_vec())).await.unwrap();

        store.delete(id_a).await.unwrap();
        store.delete(id_b).await.unwrap();
        let deleted = store.cleanup_unused_references().await.unwrap();

        assert_eq!(deleted, 1);
        let count: i64 = sqlx::query("SELECT COUNT(*) AS c FROM reference_table")
            .fetch_one(&store.pool)
            .await
            .unwrap()
            .get("c");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn update_batch_failure_preserves_original_error_kind() {
        let store = test_store().await;
        let id = store.add(NewRecord::new(vec![1], b"original".to_vec())).await.unwrap();

        let result = store
            .update_batch(vec![(id, b"new".to_vec()), (id + 1000, b"new".to_vec())])
            .await;

        match result {
            Err(SealError::Batch(failure)) => {
                assert_eq!(failure.attempted, 2);
                assert_eq!(failure.error, SealError::not_found(format!("record {}", id + 1000)));
            }
            other => panic!("expected SealError::Batch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_batch_does_not_leave_stale_reference_cache_entries() {
        let store = test_store().await;
        let id = store.add(NewRecord::new(vec![1], b"original".to_vec())).await.unwrap();

        let new_payload = b"brand new payload".to_vec();
        let result = store.update_batch(vec![(id, new_payload.clone()), (id + 1000, new_payload.clone())]).await;
        assert!(matches!(result, Err(SealError::Batch(_))));

        let hash = dedup::hash_hex(&new_payload);
        assert!(!store.reference_cache.lock().expect("reference cache mutex poisoned").contains_key(&hash));

        // A later, successful write under the same payload still creates a
        // real reference row rather than silently reusing a phantom cache
        // entry left by the rolled-back batch.
        store.add(NewRecord::new(vec![2], new_payload)).await.unwrap();
        let count: i64 = sqlx::query("SELECT COUNT(*) AS c FROM reference_table")
            .fetch_one(&store.pool)
            .await
            .unwrap()
            .get("c");
        assert_eq!(count, 2); // "original" + "brand new payload"
    }
}

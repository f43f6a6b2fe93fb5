// /////////////////////////////////////////////////////////////////////////////
// sealdb
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Secure-DB façade
//!
//! Composes the five components (C1-C5) behind a single entry point. Most
//! callers never touch [`crate::vault::KeyVault`], [`crate::sealer::Sealer`],
//! [`crate::fhe::Engine`], or [`crate::store::RecordStore`] directly --
//! [`SecureDb`] owns one of each and exposes the operation set a caller
//! actually needs: encrypt-on-write, decrypt-on-read, predicate search over
//! ciphertexts, and the bulk import/export surface.

use sealdb_domain::{CacheConfig, NewRecord, SealError, SealResult, StoreConfig};

use crate::fhe::Engine as FheEngine;
use crate::io;
use crate::sealer::Sealer;
use crate::store::{CacheLayerStats, RecordStore};

/// A record with its index and payload decrypted for the caller. Returned
/// by every façade read operation; never persisted in this form.
#[derive(Debug, Clone, PartialEq)]
pub struct DecryptedRecord {
    pub id: i64,
    pub index_value: u64,
    pub data: Vec<u8>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Composition root: homomorphic index engine (C3), symmetric sealer (C2),
/// and record store (C4+C5) wired together. Key lifecycle ([`crate::vault::KeyVault`])
/// is deliberately not owned here -- vault operations (generate, rotate,
/// back up) are an operator-driven, out-of-band concern, not part of the
/// per-record read/write path.
pub struct SecureDb {
    engine: FheEngine,
    sealer: Sealer,
    store: RecordStore,
    range_bits: u32,
}

impl SecureDb {
    /// Wires up a façade from already-constructed components. Use this when
    /// the caller has its own key-vault-driven bootstrap sequence; see
    /// `sealdb/tests/scenarios.rs` for a full example that generates keys,
    /// seals them, and reloads them through [`crate::vault::KeyVault`]
    /// before reaching this constructor.
    pub fn new(engine: FheEngine, sealer: Sealer, store: RecordStore) -> Self {
        let range_bits = engine.params().default_range_bits;
        Self { engine, sealer, store, range_bits }
    }

    /// Convenience constructor that also opens the record store.
    pub async fn connect(database_url: &str, engine: FheEngine, sealer: Sealer, store_config: StoreConfig, cache_config: &CacheConfig) -> SealResult<Self> {
        let store = RecordStore::connect(database_url, store_config, cache_config).await?;
        Ok(Self::new(engine, sealer, store))
    }

    fn encrypt_bits(&self, index_value: u64, enable_range: bool) -> SealResult<Option<Vec<Vec<u8>>>> {
        if enable_range {
            Ok(Some(self.engine.encrypt_for_range_query(index_value, self.range_bits)?))
        } else {
            Ok(None)
        }
    }

    fn to_new_record(&self, index_value: u64, data: &[u8], enable_range: bool) -> SealResult<NewRecord> {
        let encrypted_index = self.engine.encrypt_int(index_value)?;
        let encrypted_payload = self.sealer.encrypt(data)?;
        let mut record = NewRecord::new(encrypted_index, encrypted_payload);
        if let Some(bits) = self.encrypt_bits(index_value, enable_range)? {
            record = record.with_range_bits(bits);
        }
        Ok(record)
    }

    fn to_decrypted(&self, record: sealdb_domain::EncryptedRecord) -> SealResult<DecryptedRecord> {
        Ok(DecryptedRecord {
            id: record.id,
            index_value: self.engine.decrypt_int(&record.encrypted_index)?,
            data: self.sealer.decrypt(&record.encrypted_payload)?,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    // -- Writes ---------------------------------------------------------------

    #[tracing::instrument(skip(self, data))]
    pub async fn add_record(&self, index_value: u64, data: &[u8], enable_range: bool) -> SealResult<i64> {
        let record = self.to_new_record(index_value, data, enable_range)?;
        self.store.add(record).await
    }

    pub async fn add_records_batch(&self, items: Vec<(u64, Vec<u8>, bool)>) -> SealResult<Vec<i64>> {
        let records: SealResult<Vec<NewRecord>> = items.iter().map(|(v, data, range)| self.to_new_record(*v, data, *range)).collect();
        self.store.add_batch(records?).await
    }

    #[tracing::instrument(skip(self, new_data))]
    pub async fn update_record(&self, record_id: i64, new_data: &[u8]) -> SealResult<()> {
        let encrypted_payload = self.sealer.encrypt(new_data)?;
        self.store.update(record_id, encrypted_payload).await
    }

    pub async fn update_records_batch(&self, updates: Vec<(i64, Vec<u8>)>) -> SealResult<Vec<i64>> {
        let sealed: SealResult<Vec<(i64, Vec<u8>)>> = updates.into_iter().map(|(id, data)| Ok((id, self.sealer.encrypt(&data)?))).collect();
        self.store.update_batch(sealed?).await
    }

    pub async fn update_by_index(&self, index_value: u64, new_data: &[u8]) -> SealResult<Vec<i64>> {
        let encrypted_payload = self.sealer.encrypt(new_data)?;
        self.store.update_by_index(&self.engine, index_value, encrypted_payload).await
    }

    pub async fn update_by_range(&self, lo: Option<u64>, hi: Option<u64>, new_data: &[u8]) -> SealResult<Vec<i64>> {
        let encrypted_payload = self.sealer.encrypt(new_data)?;
        self.store.update_by_range(&self.engine, lo, hi, encrypted_payload).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_record(&self, record_id: i64) -> SealResult<()> {
        self.store.delete(record_id).await
    }

    pub async fn delete_records_batch(&self, ids: &[i64]) -> SealResult<()> {
        self.store.delete_batch(ids).await
    }

    pub async fn delete_by_index(&self, index_value: u64) -> SealResult<Vec<i64>> {
        self.store.delete_by_index(&self.engine, index_value).await
    }

    pub async fn delete_by_range(&self, lo: Option<u64>, hi: Option<u64>) -> SealResult<Vec<i64>> {
        self.store.delete_by_range(&self.engine, lo, hi).await
    }

    // -- Reads ------------------------------------------------------------------

    pub async fn get_record(&self, record_id: i64) -> SealResult<Option<DecryptedRecord>> {
        match self.store.get_by_id(record_id).await? {
            Some(record) => Ok(Some(self.to_decrypted(record)?)),
            None => Ok(None),
        }
    }

    pub async fn get_records_batch(&self, ids: &[i64]) -> SealResult<Vec<DecryptedRecord>> {
        let records = self.store.get_by_ids(ids).await?;
        records.into_iter().map(|r| self.to_decrypted(r)).collect()
    }

    #[tracing::instrument(skip(self))]
    pub async fn search_by_index(&self, index_value: u64) -> SealResult<Vec<DecryptedRecord>> {
        let records = self.store.search_by_encrypted_index(&self.engine, index_value).await?;
        records.into_iter().map(|r| self.to_decrypted(r)).collect()
    }

    #[tracing::instrument(skip(self))]
    pub async fn search_by_range(&self, lo: Option<u64>, hi: Option<u64>) -> SealResult<Vec<DecryptedRecord>> {
        let records = self.store.search_by_range(&self.engine, lo, hi).await?;
        records.into_iter().map(|r| self.to_decrypted(r)).collect()
    }

    // -- Maintenance --------------------------------------------------------------

    pub async fn cleanup_references(&self) -> SealResult<usize> {
        self.store.cleanup_unused_references().await
    }

    pub fn get_cache_stats(&self) -> CacheLayerStats {
        self.store.get_cache_stats()
    }

    pub fn clear_caches(&self) {
        self.store.clear_caches();
        self.engine.clear_cache();
    }

    // -- Bulk import / export ------------------------------------------------------

    /// Raw ciphertext dump of every record: suitable for backup/transfer
    /// between two holders of the same key material. No decryption occurs.
    pub async fn export_data(&self) -> SealResult<String> {
        let records = self.store.all_records().await?;
        io::to_data_json(&records)
    }

    /// Decrypted, human-inspectable dump: `index_value` and `data` in the
    /// clear. Requires the engine to hold the secret key.
    pub async fn export_records(&self) -> SealResult<String> {
        if !self.engine.is_full() {
            return Err(SealError::ModeError);
        }
        let records = self.store.all_records().await?;
        io::to_records_json(&records, &self.engine, &self.sealer)
    }

    /// Imports the generic entry schema: verbatim ciphertext entries are
    /// inserted as-is, and `(index_value, data)` entries are encrypted
    /// fresh. `enable_range` governs whether re-encrypted entries also get
    /// a bit-ciphertext index.
    pub async fn import_data(&self, json: &str, enable_range: bool) -> SealResult<Vec<i64>> {
        let range_bits = enable_range.then_some(self.range_bits);
        let parsed = io::from_data_json(json, &self.engine, &self.sealer, range_bits)?;
        let records: Vec<NewRecord> = parsed
            .into_iter()
            .map(|(idx, payload, bits)| {
                let mut record = NewRecord::new(idx, payload);
                if let Some(bits) = bits {
                    record = record.with_range_bits(bits);
                }
                record
            })
            .collect();
        self.store.add_batch(records).await
    }

    /// Imports a plaintext-only entry list, always re-encrypting.
    pub async fn import_records(&self, json: &str, enable_range: bool) -> SealResult<Vec<i64>> {
        let range_bits = enable_range.then_some(self.range_bits);
        let parsed = io::from_records_json(json, &self.engine, &self.sealer, range_bits)?;
        let records: Vec<NewRecord> = parsed
            .into_iter()
            .map(|(idx, payload, bits)| {
                let mut record = NewRecord::new(idx, payload);
                if let Some(bits) = bits {
                    record = record.with_range_bits(bits);
                }
                record
            })
            .collect();
        self.store.add_batch(records).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealdb_domain::{AesMasterKey, FheParameters};

    async fn test_db() -> SecureDb {
        let params = FheParameters::default();
        let keys = FheEngine::generate_keypair(&params).unwrap();
        let engine = FheEngine::new_full(params, &keys.public_key, &keys.secret_key, &keys.relin_keys, &keys.galois_keys).unwrap();
        let sealer = Sealer::new(AesMasterKey::from_bytes(vec![4u8; 32]).unwrap());
        let store = RecordStore::connect("sqlite::memory:", StoreConfig::default(), &CacheConfig::default()).await.unwrap();
        SecureDb::new(engine, sealer, store)
    }

    #[tokio::test]
    async fn round_trip_insert_and_search() {
        let db = test_db().await;
        let id = db.add_record(42, b"hello", false).await.unwrap();

        let fetched = db.get_record(id).await.unwrap().unwrap();
        assert_eq!(fetched.data, b"hello");
        assert_eq!(fetched.index_value, 42);

        let hits = db.search_by_index(42).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].data, b"hello");

        let misses = db.search_by_index(43).await.unwrap();
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn range_search_across_four_records() {
        let db = test_db().await;
        db.add_record(10, b"a", true).await.unwrap();
        db.add_record(20, b"b", true).await.unwrap();
        db.add_record(30, b"c", true).await.unwrap();
        db.add_record(40, b"d", true).await.unwrap();

        let mid = db.search_by_range(Some(15), Some(35)).await.unwrap();
        let mut data: Vec<Vec<u8>> = mid.iter().map(|r| r.data.clone()).collect();
        data.sort();
        assert_eq!(data, vec![b"b".to_vec(), b"c".to_vec()]);

        let low = db.search_by_range(None, Some(10)).await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].data, b"a");

        let high = db.search_by_range(Some(40), None).await.unwrap();
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].data, b"d");
    }

    #[tokio::test]
    async fn update_then_delete_round_trip() {
        let db = test_db().await;
        let id = db.add_record(5, b"old", false).await.unwrap();
        db.update_record(id, b"new").await.unwrap();
        assert_eq!(db.get_record(id).await.unwrap().unwrap().data, b"new");

        db.delete_record(id).await.unwrap();
        assert_eq!(db.get_record(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn export_then_import_records_round_trips_plaintext() {
        let db = test_db().await;
        db.add_record(7, b"secret", false).await.unwrap();
        let json = db.export_records().await.unwrap();

        let db2 = test_db().await;
        let ids = db2.import_records(&json, false).await.unwrap();
        assert_eq!(ids.len(), 1);
        let hits = db2.search_by_index(7).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].data, b"secret");
    }

    #[tokio::test]
    async fn export_then_import_data_round_trips_ciphertext() {
        let db = test_db().await;
        db.add_record(9, b"payload", false).await.unwrap();
        let json = db.export_data().await.unwrap();

        let db2 = test_db().await;
        let ids = db2.import_data(&json, false).await.unwrap();
        assert_eq!(ids.len(), 1);
        // Ciphertexts were minted under db's own keys, not db2's -- the
        // record store accepts them verbatim (it never inspects
        // ciphertext content), but a different engine/sealer instance
        // cannot decrypt them. Confirm the row exists at least.
        assert!(db2.store.get_by_id(ids[0]).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cache_stats_and_clear_caches_are_reachable() {
        let db = test_db().await;
        db.add_record(1, b"x", false).await.unwrap();
        let _ = db.search_by_index(1).await.unwrap();
        let stats = db.get_cache_stats();
        assert!(stats.equality.size <= 1);
        db.clear_caches();
        assert_eq!(db.get_cache_stats().record.size, 0);
    }
}

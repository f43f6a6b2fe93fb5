// /////////////////////////////////////////////////////////////////////////////
// sealdb
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Entities
//!
//! The three persistent entities of the record store (§3 of the design):
//! [`EncryptedRecord`], [`ReferenceEntry`], and [`RangeQueryBit`]. Each
//! constructor enforces the entity's non-structural invariants (non-empty
//! ciphertexts, `updated_at >= created_at`); the relational invariants
//! (uniqueness, cascade) are the record store's responsibility since they
//! require a database session to check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SealError, SealResult};

/// A row in `encrypted_records`: an opaque BFV ciphertext of the indexing
/// integer, an opaque AES-GCM-sealed payload, and server-assigned
/// timestamps. The index is immutable once a row exists; only the payload
/// can be updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedRecord {
    pub id: i64,
    pub encrypted_index: Vec<u8>,
    pub encrypted_payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EncryptedRecord {
    /// Builds a new record for insertion. `id` is left at 0 and assigned by
    /// the store on insert (auto-increment primary key).
    pub fn new(encrypted_index: Vec<u8>, encrypted_payload: Vec<u8>) -> SealResult<Self> {
        if encrypted_index.is_empty() {
            return Err(SealError::Internal("encrypted_index must not be empty".into()));
        }
        if encrypted_payload.is_empty() {
            return Err(SealError::Internal("encrypted_payload must not be empty".into()));
        }
        let now = Utc::now();
        Ok(Self {
            id: 0,
            encrypted_index,
            encrypted_payload,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replaces the payload ciphertext, bumping `updated_at`. The index is
    /// intentionally not mutable through this method: range/equality
    /// predicates are defined over the index at insert time.
    pub fn with_updated_payload(mut self, encrypted_payload: Vec<u8>) -> SealResult<Self> {
        if encrypted_payload.is_empty() {
            return Err(SealError::Internal("encrypted_payload must not be empty".into()));
        }
        self.encrypted_payload = encrypted_payload;
        self.updated_at = Utc::now();
        Ok(self)
    }

    pub fn is_well_formed(&self) -> bool {
        !self.encrypted_index.is_empty() && !self.encrypted_payload.is_empty() && self.updated_at >= self.created_at
    }
}

/// A content-addressed dedup bookkeeping row in `reference_table`. Multiple
/// `EncryptedRecord` rows may share an identical payload ciphertext; this
/// table tracks the hash so garbage collection can find dead copies.
///
/// Divergence flagged in the design: the reference table does not actually
/// become the canonical storage location for `encrypted_records.encrypted_payload`
/// -- both columns independently hold the ciphertext blob. This entity
/// reproduces that divergence rather than "fixing" it, because a faithful
/// rewrite must preserve observable behavior (see `DESIGN.md`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub id: i64,
    pub hash_value: String,
    pub encrypted_data: Vec<u8>,
}

impl ReferenceEntry {
    pub fn new(hash_value: impl Into<String>, encrypted_data: Vec<u8>) -> Self {
        Self {
            id: 0,
            hash_value: hash_value.into(),
            encrypted_data,
        }
    }
}

/// One bit of a record's range-query bit-ciphertext index, in
/// `range_query_indices`. `bit_position` 0 is the least significant bit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeQueryBit {
    pub id: i64,
    pub record_id: i64,
    pub bit_position: u32,
    pub encrypted_bit: Vec<u8>,
}

impl RangeQueryBit {
    pub fn new(record_id: i64, bit_position: u32, encrypted_bit: Vec<u8>) -> Self {
        Self {
            id: 0,
            record_id,
            bit_position,
            encrypted_bit,
        }
    }
}

/// Input to `RecordStore::add`: the already-sealed index and payload, plus
/// an optional ordered list of bit ciphertexts (LSB first) if range
/// querying should be enabled for this record.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub encrypted_index: Vec<u8>,
    pub encrypted_payload: Vec<u8>,
    pub encrypted_bits: Option<Vec<Vec<u8>>>,
}

impl NewRecord {
    pub fn new(encrypted_index: Vec<u8>, encrypted_payload: Vec<u8>) -> Self {
        Self {
            encrypted_index,
            encrypted_payload,
            encrypted_bits: None,
        }
    }

    pub fn with_range_bits(mut self, encrypted_bits: Vec<Vec<u8>>) -> Self {
        self.encrypted_bits = Some(encrypted_bits);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_rejects_empty_ciphertexts() {
        assert!(EncryptedRecord::new(vec![], vec![1]).is_err());
        assert!(EncryptedRecord::new(vec![1], vec![]).is_err());
        assert!(EncryptedRecord::new(vec![1], vec![1]).is_ok());
    }

    #[test]
    fn updated_payload_bumps_updated_at_without_moving_created_at() {
        let record = EncryptedRecord::new(vec![1], vec![2]).unwrap();
        let created_at = record.created_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        let updated = record.with_updated_payload(vec![3]).unwrap();
        assert_eq!(updated.created_at, created_at);
        assert!(updated.updated_at >= created_at);
        assert!(updated.is_well_formed());
    }
}

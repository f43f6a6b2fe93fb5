// /////////////////////////////////////////////////////////////////////////////
// sealdb
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Import / export JSON
//!
//! The wire format for bulk import and export, per the external interface
//! contract: an array of objects carrying either a plaintext
//! `(index_value, data)` pair to be (re-)encrypted on import, or verbatim
//! base64-encoded ciphertexts to be inserted as-is. The two export flavors
//! the façade exposes -- [`to_data_json`] (ciphertext, for backup/transfer)
//! and [`to_records_json`] (decrypted, for operator inspection) -- both
//! serialize to this same entry shape, just with different fields populated.
//!
//! JSON parsing and serialization themselves are the `serde_json`
//! collaborator's job, same as the teacher's infrastructure layer; this
//! module only defines the shape and the encrypt/decrypt glue either side
//! of it.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use sealdb_domain::{EncryptedRecord, SealError, SealResult};

use crate::fhe::Engine as FheEngine;
use crate::sealer::Sealer;

/// One entry of the import/export array. `id` is present on export and
/// ignored on import (ids are server-assigned). Exactly one of
/// `(index_value, data)` or `(encrypted_index, encrypted_payload)` is
/// expected to carry real content per direction; the other pair is `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JsonRecordEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_value: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_index: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_payload: Option<String>,
}

fn encode_b64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

fn decode_b64(field: &str, value: &str) -> SealResult<Vec<u8>> {
    BASE64.decode(value).map_err(|e| SealError::internal(format!("malformed base64 in {field}: {e}")))
}

/// Serializes `records` verbatim as base64-wrapped ciphertext -- no
/// decryption, suitable for a raw backup or transfer between two holders of
/// the same key material.
pub fn to_data_json(records: &[EncryptedRecord]) -> SealResult<String> {
    let entries: Vec<JsonRecordEntry> = records
        .iter()
        .map(|r| JsonRecordEntry {
            id: Some(r.id),
            index_value: None,
            data: None,
            encrypted_index: Some(encode_b64(&r.encrypted_index)),
            encrypted_payload: Some(encode_b64(&r.encrypted_payload)),
        })
        .collect();
    serde_json::to_string_pretty(&entries).map_err(SealError::from)
}

/// Parses the generic entry schema. Entries carrying `encrypted_*` fields
/// are decoded and returned as `(id, ciphertext_index, ciphertext_payload)`
/// for verbatim insertion; entries carrying `(index_value, data)` are
/// encrypted fresh against `engine`/`sealer`. Mixed batches are allowed.
pub fn from_data_json(json: &str, engine: &FheEngine, sealer: &Sealer, range_bits: Option<u32>) -> SealResult<Vec<(Vec<u8>, Vec<u8>, Option<Vec<Vec<u8>>>)>> {
    let entries: Vec<JsonRecordEntry> = serde_json::from_str(json)?;
    entries
        .into_iter()
        .map(|entry| match (entry.encrypted_index, entry.encrypted_payload) {
            (Some(idx), Some(payload)) => {
                let encrypted_index = decode_b64("encrypted_index", &idx)?;
                let encrypted_payload = decode_b64("encrypted_payload", &payload)?;
                Ok((encrypted_index, encrypted_payload, None))
            }
            _ => {
                let index_value = entry.index_value.ok_or_else(|| SealError::internal("entry has neither ciphertext nor index_value"))?;
                let data = entry.data.ok_or_else(|| SealError::internal("entry has neither ciphertext nor data"))?;
                let encrypted_index = engine.encrypt_int(index_value)?;
                let encrypted_payload = sealer.encrypt_str(&data)?;
                let bits = match range_bits {
                    Some(bits) => Some(engine.encrypt_for_range_query(index_value, bits)?),
                    None => None,
                };
                Ok((encrypted_index, encrypted_payload, bits))
            }
        })
        .collect()
}

/// Serializes `records` decrypted: `index_value` via the engine (requires
/// [`crate::fhe::Engine::Full`]) and `data` via the sealer. Intended for
/// operator-facing export, not for re-import of ciphertext backups.
pub fn to_records_json(records: &[EncryptedRecord], engine: &FheEngine, sealer: &Sealer) -> SealResult<String> {
    let entries: SealResult<Vec<JsonRecordEntry>> = records
        .iter()
        .map(|r| {
            let index_value = engine.decrypt_int(&r.encrypted_index)?;
            let data = sealer.decrypt_str(&r.encrypted_payload)?;
            Ok(JsonRecordEntry {
                id: Some(r.id),
                index_value: Some(index_value),
                data: Some(data),
                encrypted_index: None,
                encrypted_payload: None,
            })
        })
        .collect();
    serde_json::to_string_pretty(&entries?).map_err(SealError::from)
}

/// Parses a plaintext-only entry list, always re-encrypting `(index_value,
/// data)` against `engine`/`sealer` regardless of any `encrypted_*` fields
/// present (those are ignored on this path).
pub fn from_records_json(json: &str, engine: &FheEngine, sealer: &Sealer, range_bits: Option<u32>) -> SealResult<Vec<(Vec<u8>, Vec<u8>, Option<Vec<Vec<u8>>>)>> {
    let entries: Vec<JsonRecordEntry> = serde_json::from_str(json)?;
    entries
        .into_iter()
        .map(|entry| {
            let index_value = entry.index_value.ok_or_else(|| SealError::internal("entry missing index_value"))?;
            let data = entry.data.ok_or_else(|| SealError::internal("entry missing data"))?;
            let encrypted_index = engine.encrypt_int(index_value)?;
            let encrypted_payload = sealer.encrypt_str(&data)?;
            let bits = match range_bits {
                Some(bits) => Some(engine.encrypt_for_range_query(index_value, bits)?),
                None => None,
            };
            Ok((encrypted_index, encrypted_payload, bits))
        })
        .collect()
}

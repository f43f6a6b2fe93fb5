// /////////////////////////////////////////////////////////////////////////////
// sealdb
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Relational schema for the three persistent entities (§3). Parent-child
//! cascade between `encrypted_records` and `range_query_indices` is
//! modelled as an explicit delete protocol in [`super::RecordStore`]
//! rather than an SQL `ON DELETE CASCADE`, independent of any ORM cascade
//! feature.

/// Executed in order against a fresh or existing database on store
/// construction. Each statement is idempotent (`IF NOT EXISTS`).
pub const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS encrypted_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        encrypted_index BLOB NOT NULL,
        encrypted_payload BLOB NOT NULL,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_encrypted_records_encrypted_index
        ON encrypted_records(encrypted_index)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reference_table (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        hash_value VARCHAR(64) NOT NULL,
        encrypted_data BLOB NOT NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_reference_table_hash_value
        ON reference_table(hash_value)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS range_query_indices (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        record_id INTEGER NOT NULL,
        bit_position INTEGER NOT NULL,
        encrypted_bit BLOB NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_range_query_indices_record_id
        ON range_query_indices(record_id)
    "#,
];

// /////////////////////////////////////////////////////////////////////////////
// sealdb
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Internal comparison memo for the homomorphic index engine. Keyed by
//! `(operation, ciphertext-hash, query)`; a performance hint only -- cache
//! presence must never be observable by a caller.

use std::collections::HashMap;
use std::sync::Mutex;

use twox_hash::XxHash64;
use std::hash::Hasher;

#[derive(Default)]
pub struct ComparisonCache {
    entries: Mutex<HashMap<String, bool>>,
}

impl ComparisonCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<bool> {
        self.entries.lock().expect("comparison cache mutex poisoned").get(key).copied()
    }

    pub fn put(&self, key: String, value: bool) {
        self.entries.lock().expect("comparison cache mutex poisoned").insert(key, value);
    }

    pub fn clear(&self) {
        self.entries.lock().expect("comparison cache mutex poisoned").clear();
    }
}

/// Builds a memo key from an operation tag, a ciphertext blob, and a
/// plaintext query descriptor. The ciphertext is hashed rather than stored
/// verbatim -- the memo only ever needs to recognize a repeat, not
/// reproduce the ciphertext.
pub fn key(op: &str, ciphertext: &[u8], query: &str) -> String {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(ciphertext);
    format!("{op}:{:016x}:{query}", hasher.finish())
}

// /////////////////////////////////////////////////////////////////////////////
// sealdb
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Key Material
//!
//! Sensitive in-memory key bytes, wrapped so they are zeroized on drop
//! rather than left to linger in freed heap pages. These wrappers carry raw
//! bytes only -- the BFV key *types* themselves live in the `sealdb`
//! infrastructure crate, next to the concrete homomorphic library binding.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The AES-256 master key used by the symmetric sealer (C2). Immutable
/// after construction and shared by reference for the life of a process.
#[derive(Clone, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct AesMasterKey {
    bytes: Vec<u8>,
}

impl AesMasterKey {
    pub const LEN: usize = 32;

    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        if bytes.len() == Self::LEN {
            Some(Self { bytes })
        } else {
            None
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for AesMasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesMasterKey").field("bytes", &"<redacted>").finish()
    }
}

/// Raw bytes carried between the vault's at-rest codec and the caller,
/// zeroized on drop since they are plaintext key material while in transit.
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct SensitiveBytes(Vec<u8>);

impl SensitiveBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn into_vec(mut self) -> Vec<u8> {
        // Takes the bytes out before `self` drops, so the caller's copy is
        // not immediately zeroized out from under them.
        std::mem::take(&mut self.0)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl Zeroize for SensitiveBytes {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for SensitiveBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SensitiveBytes").field(&"<redacted>").finish()
    }
}

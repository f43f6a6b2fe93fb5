// /////////////////////////////////////////////////////////////////////////////
// sealdb
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Content-addressed deduplication. `xxhash64` is a fast non-cryptographic
//! hash -- used only to find repeat ciphertexts, never for any security
//! property.

use std::hash::Hasher;
use twox_hash::XxHash64;

/// Hashes `data` with xxhash64 and returns the lowercase hex encoding, the
/// format stored in `reference_table.hash_value`.
pub fn hash_hex(data: &[u8]) -> String {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(data);
    hex::encode(hasher.finish().to_be_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_payloads_hash_identically() {
        assert_eq!(hash_hex(b"same payload"), hash_hex(b"same payload"));
    }

    #[test]
    fn distinct_payloads_hash_differently() {
        assert_ne!(hash_hex(b"payload a"), hash_hex(b"payload b"));
    }

    #[test]
    fn hash_is_sixteen_hex_characters() {
        assert_eq!(hash_hex(b"anything").len(), 16);
    }
}

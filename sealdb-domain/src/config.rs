// /////////////////////////////////////////////////////////////////////////////
// sealdb
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Configuration
//!
//! Every component takes an immutable configuration struct at construction
//! time rather than reading process-wide globals. This is a deliberate
//! departure from the reference system, which reads crypto parameters from
//! module-level globals; threading an explicit struct through constructors
//! keeps the core free of hidden mutable state and makes every instance
//! independently testable.

use std::path::PathBuf;

/// BFV scheme parameters for the homomorphic index engine.
///
/// The default values are the ones the design fixes: a 8192-degree
/// polynomial ring, a 20-bit batching-capable plaintext modulus, and a
/// `[60, 40, 40, 60]` coefficient modulus chain sized to survive the
/// multiplicative depth of the bitwise range comparator at the default bit
/// width.
#[derive(Debug, Clone, PartialEq)]
pub struct FheParameters {
    /// Lattice dimension. Must be a power of two.
    pub poly_modulus_degree: u64,

    /// Plaintext modulus. Must support batching at `poly_modulus_degree`.
    pub plain_modulus: u64,

    /// Bit sizes of the coefficient modulus chain primes, largest first and
    /// last ("special modulus" at both ends), matching how SEAL picks a
    /// usable chain for a requested set of bit lengths.
    pub coeff_modulus_bits: Vec<usize>,

    /// Default bit width `B` used by `encrypt_for_range_query` when the
    /// caller does not specify one.
    pub default_range_bits: u32,
}

impl Default for FheParameters {
    fn default() -> Self {
        Self {
            poly_modulus_degree: 8192,
            plain_modulus: 1_032_193,
            coeff_modulus_bits: vec![60, 40, 40, 60],
            default_range_bits: 32,
        }
    }
}

impl FheParameters {
    /// Multiplicative depth available before the final special modulus,
    /// i.e. the number of interior primes. `compare_range` at bit width `B`
    /// needs depth `>= B`; callers should check this before trusting a
    /// chosen `coeff_modulus_bits` with a wide range query.
    pub fn available_depth(&self) -> usize {
        self.coeff_modulus_bits.len().saturating_sub(2)
    }
}

/// Configuration for the key vault (C1): where key material lives on disk
/// and the fixed KDF cost used to wrap it.
#[derive(Debug, Clone, PartialEq)]
pub struct VaultConfig {
    /// Root directory holding context params, key files, and `backups/`.
    pub keys_dir: PathBuf,

    /// PBKDF2-HMAC-SHA256 iteration count used to derive the KEK that wraps
    /// the AES master key and, optionally, the BFV secret key. Fixed at
    /// 100,000 per the at-rest format contract; not configurable, because
    /// the keyfile format is bit-exact and callers must agree on it.
    pub pbkdf2_iterations: u32,

    /// zstd compression level applied to exported key blobs before they are
    /// written to disk.
    pub zstd_level: i32,
}

impl VaultConfig {
    pub fn new(keys_dir: impl Into<PathBuf>) -> Self {
        Self {
            keys_dir: keys_dir.into(),
            pbkdf2_iterations: 100_000,
            zstd_level: 9,
        }
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.keys_dir.join("backups")
    }
}

/// Capacity for each of the three bounded LRU caches in the query/cache
/// layer (C5): record-by-id, equality-query-by-value, range-query-by-key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub record_cache_capacity: usize,
    pub equality_cache_capacity: usize,
    pub range_cache_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            record_cache_capacity: 1000,
            equality_cache_capacity: 1000,
            range_cache_capacity: 1000,
        }
    }
}

/// Per-query timeout bounding the SQL round-trip only; homomorphic
/// evaluation is CPU-bound and is not subject to this timeout (see the
/// concurrency model). Range-query bit width is an encoding concern of the
/// homomorphic index engine, not the store, so it lives on
/// [`FheParameters::default_range_bits`] instead of being duplicated here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    pub query_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { query_timeout_secs: 30 }
    }
}

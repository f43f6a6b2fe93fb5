// /////////////////////////////////////////////////////////////////////////////
// sealdb
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # sealdb-domain
//!
//! Pure, reusable types for a privacy-preserving encrypted record store:
//! entities, configuration, key material wrappers, and the error taxonomy.
//! Nothing in this crate touches a filesystem, a database connection, or a
//! homomorphic encryption library -- those are infrastructure concerns that
//! live in the `sealdb` crate, which depends on this one.

pub mod config;
pub mod error;
pub mod keymaterial;
pub mod record;

pub use config::{CacheConfig, FheParameters, StoreConfig, VaultConfig};
pub use error::{BatchFailure, SealError, SealResult};
pub use keymaterial::{AesMasterKey, SensitiveBytes};
pub use record::{EncryptedRecord, NewRecord, RangeQueryBit, ReferenceEntry};

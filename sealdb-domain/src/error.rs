// /////////////////////////////////////////////////////////////////////////////
// sealdb
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error Module
//!
//! Structured error taxonomy for the encrypted record store. Every fallible
//! operation in `sealdb` and `sealdb-domain` returns one of these variants;
//! nothing in the core panics on user-induced failure.
//!
//! The taxonomy mirrors the one-word kinds used by the system's design: a
//! wrong password and a tampered keyfile both surface as [`SealError::KeyAuthFail`]
//! so that callers cannot distinguish the two (an oracle for tampering would
//! otherwise leak which attack is in progress).

use thiserror::Error;

/// Errors surfaced by the key vault, symmetric sealer, homomorphic index
/// engine, record store, and query/cache layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SealError {
    /// Wrong password, or a keyfile/archive that failed its integrity check.
    #[error("key authentication failed")]
    KeyAuthFail,

    /// A keyfile, record id, or reference entry does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Filesystem or SQL transport failure.
    #[error("io failure: {0}")]
    IoFail(String),

    /// An integer lies outside its representable range, or a bit list's
    /// length does not match the declared bit width.
    #[error("encoding out of range: {0}")]
    EncodeRange(String),

    /// AES-GCM tag verification failed: wrong key or tampered payload.
    #[error("payload authentication failed")]
    AuthFail,

    /// BFV noise budget exhausted before the final decrypt of a comparison.
    #[error("homomorphic evaluation exceeded noise budget: {0}")]
    CryptoCapacity(String),

    /// A decrypt or compare operation was attempted on an encrypt-only
    /// engine instance (no secret key held).
    #[error("operation requires an engine holding the secret key")]
    ModeError,

    /// Invariant violation: a programmer error, not a user-induced failure.
    #[error("internal invariant violation: {0}")]
    Internal(String),

    /// A batch mutation failed partway through; the wrapped [`BatchFailure`]
    /// carries the original error kind rather than collapsing it to
    /// [`SealError::Internal`].
    #[error("{0}")]
    Batch(Box<BatchFailure>),
}

impl SealError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn io_fail(msg: impl Into<String>) -> Self {
        Self::IoFail(msg.into())
    }

    pub fn encode_range(msg: impl Into<String>) -> Self {
        Self::EncodeRange(msg.into())
    }

    pub fn crypto_capacity(msg: impl Into<String>) -> Self {
        Self::CryptoCapacity(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wraps `error` (the failure hit partway through a batch of `attempted`
    /// rows) so its original kind survives instead of being collapsed to
    /// [`SealError::Internal`].
    pub fn batch(attempted: usize, error: SealError) -> Self {
        Self::Batch(Box::new(BatchFailure { attempted, error }))
    }

    /// Stable, machine-readable category, used by callers that want to log
    /// or branch on the failure kind without matching every variant.
    pub fn category(&self) -> &'static str {
        match self {
            SealError::KeyAuthFail => "key_auth_fail",
            SealError::NotFound(_) => "not_found",
            SealError::IoFail(_) => "io_fail",
            SealError::EncodeRange(_) => "encode_range",
            SealError::AuthFail => "auth_fail",
            SealError::CryptoCapacity(_) => "crypto_capacity",
            SealError::ModeError => "mode_error",
            SealError::Internal(_) => "internal",
            SealError::Batch(_) => "batch",
        }
    }

    /// Wrong password and a tampered file are reported identically; this
    /// flags the class of errors that must never grow a distinguishing
    /// side channel (timing, error text) between the two causes.
    pub fn is_authentication_oracle_sensitive(&self) -> bool {
        matches!(self, SealError::KeyAuthFail | SealError::AuthFail)
    }
}

impl From<std::io::Error> for SealError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => SealError::NotFound(err.to_string()),
            _ => SealError::IoFail(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for SealError {
    fn from(err: serde_json::Error) -> Self {
        SealError::Internal(format!("serialization error: {err}"))
    }
}

/// Convenience alias used throughout the core.
pub type SealResult<T> = Result<T, SealError>;

/// Outcome of a batch mutation: `IO_FAIL` inside a batch rolls the
/// transaction back and is surfaced as a single error carrying the count of
/// rows that were attempted, per the propagation rules in the design.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub attempted: usize,
    pub error: SealError,
}

impl std::fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "batch of {} rows failed: {}", self.attempted, self.error)
    }
}

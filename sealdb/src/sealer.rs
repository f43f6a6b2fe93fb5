// /////////////////////////////////////////////////////////////////////////////
// sealdb
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Symmetric Sealer (C2)
//!
//! Authenticated encryption of opaque payload bytes. The sealed layout is
//! fixed and public: `IV(12) || TAG(16) || CIPHERTEXT`, AES-256-GCM, a
//! fresh random IV drawn from the OS CSPRNG on every call. Batch variants
//! apply the single-call contract pointwise -- there is no cross-item
//! state, so a failure on one item never poisons the others.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand_core::RngCore;
use sealdb_domain::{AesMasterKey, SealError, SealResult};

pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// AES-256-GCM sealer over an immutable master key.
///
/// # Thread safety
/// `Sealer` holds no mutable state; the master key is shared by reference
/// (`Arc`-friendly, `Clone`) and zeroized on its own drop.
#[derive(Clone)]
pub struct Sealer {
    key: AesMasterKey,
}

impl Sealer {
    pub fn new(key: AesMasterKey) -> Self {
        Self { key }
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_bytes()))
    }

    /// Encrypts `plaintext`, returning `IV || TAG || CIPHERTEXT`. Never
    /// reuses an IV under the same key: each call draws 12 fresh bytes
    /// from a cryptographic RNG. The `aes-gcm` crate itself produces
    /// `CIPHERTEXT || TAG`, so the tag is split off and moved ahead of the
    /// ciphertext to match the fixed on-wire layout.
    #[tracing::instrument(skip_all, fields(len = plaintext.len()))]
    pub fn encrypt(&self, plaintext: &[u8]) -> SealResult<Vec<u8>> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);
        let nonce = Nonce::from_slice(&iv);

        let ciphertext_and_tag = self
            .cipher()
            .encrypt(nonce, plaintext)
            .map_err(|_| SealError::Internal("AES-GCM encryption failed".into()))?;
        let tag_at = ciphertext_and_tag.len() - TAG_LEN;
        let (ciphertext, tag) = ciphertext_and_tag.split_at(tag_at);

        let mut sealed = Vec::with_capacity(IV_LEN + TAG_LEN + ciphertext.len());
        sealed.extend_from_slice(&iv);
        sealed.extend_from_slice(tag);
        sealed.extend_from_slice(ciphertext);
        Ok(sealed)
    }

    /// Decrypts a blob previously produced by [`Sealer::encrypt`]. Fails
    /// with [`SealError::AuthFail`] if the GCM tag does not verify -- this
    /// is the only failure mode, and it is reported identically whether
    /// the cause was a wrong key or a tampered ciphertext.
    #[tracing::instrument(skip_all, fields(len = sealed.len()))]
    pub fn decrypt(&self, sealed: &[u8]) -> SealResult<Vec<u8>> {
        if sealed.len() < IV_LEN + TAG_LEN {
            return Err(SealError::AuthFail);
        }
        let (iv, rest) = sealed.split_at(IV_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);
        let nonce = Nonce::from_slice(iv);

        let mut ciphertext_and_tag = Vec::with_capacity(ciphertext.len() + TAG_LEN);
        ciphertext_and_tag.extend_from_slice(ciphertext);
        ciphertext_and_tag.extend_from_slice(tag);

        self.cipher()
            .decrypt(nonce, ciphertext_and_tag.as_slice())
            .map_err(|_| SealError::AuthFail)
    }

    /// Encrypts a UTF-8 string, a thin convenience over `encrypt`.
    pub fn encrypt_str(&self, plaintext: &str) -> SealResult<Vec<u8>> {
        self.encrypt(plaintext.as_bytes())
    }

    /// Decrypts into a UTF-8 string. Fails with `AuthFail` on tag mismatch
    /// and with `Internal` if the plaintext bytes are not valid UTF-8.
    pub fn decrypt_str(&self, sealed: &[u8]) -> SealResult<String> {
        let bytes = self.decrypt(sealed)?;
        String::from_utf8(bytes).map_err(|e| SealError::Internal(format!("decrypted payload is not UTF-8: {e}")))
    }

    /// Pointwise batch encryption; a failure on one item does not affect
    /// the others (each call is independent).
    pub fn encrypt_batch(&self, plaintexts: &[&[u8]]) -> SealResult<Vec<Vec<u8>>> {
        plaintexts.iter().map(|p| self.encrypt(p)).collect()
    }

    /// Pointwise batch decryption.
    pub fn decrypt_batch(&self, sealed: &[&[u8]]) -> SealResult<Vec<Vec<u8>>> {
        sealed.iter().map(|s| self.decrypt(s)).collect()
    }
}

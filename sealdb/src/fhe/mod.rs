// /////////////////////////////////////////////////////////////////////////////
// sealdb
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Homomorphic Index Engine (C3)
//!
//! Wraps a BFV context (via `sealy`, Microsoft SEAL's batching scheme) to
//! encrypt indexing integers and evaluate equality and bounded-width range
//! predicates entirely over ciphertexts. An engine instance is either
//! [`Engine::Full`] (holds the secret key, can decrypt and compare) or
//! [`Engine::EncryptOnly`] (can only encrypt); the tagged-variant split
//! keeps decrypt operations unreachable from an encrypt-only instance at
//! the type level rather than behind a runtime `Option` check.

mod cache;
mod compare;
mod context;

pub use context::SealContext;

use sealdb_domain::{FheParameters, SealError, SealResult};
use sealy::{
    BFVEncoder, BFVEvaluator, Ciphertext, Decryptor, Encoder, Encryptor, Evaluator, FromBytes, GaloisKeys, KeyGenerator,
    Plaintext, PublicKey, RelinearizationKeys, SecretKey, ToBytes,
};

use cache::ComparisonCache;

/// Raw, zstd-compressed BFV ciphertext bytes -- the only representation of
/// a ciphertext that crosses the C3 boundary. The envelope is not
/// authenticated; integrity for anything that matters is AES-GCM's job
/// (see the symmetric sealer).
pub type CiphertextBytes = Vec<u8>;

const ZSTD_LEVEL: i32 = 9;

/// Freshly generated BFV key material, as produced by [`Engine::generate_keypair`].
/// Raw (uncompressed) bytes, ready to be handed to the key vault for
/// compression and at-rest protection.
pub struct GeneratedKeys {
    pub public_key: Vec<u8>,
    pub secret_key: Vec<u8>,
    pub relin_keys: Vec<u8>,
    pub galois_keys: Vec<u8>,
}

/// The homomorphic index engine. See the module documentation for the
/// full/encrypt-only split.
pub enum Engine {
    Full {
        ctx: SealContext,
        params: FheParameters,
        encoder: BFVEncoder,
        evaluator: BFVEvaluator,
        encryptor: Encryptor,
        decryptor: Decryptor,
        relin_keys: RelinearizationKeys,
        #[allow(dead_code)] // retained for symmetry with the vault-managed key set; no rotation path needs it yet
        galois_keys: GaloisKeys,
        cache: ComparisonCache,
    },
    EncryptOnly {
        ctx: SealContext,
        params: FheParameters,
        encoder: BFVEncoder,
        encryptor: Encryptor,
    },
}

impl Engine {
    /// Generates a fresh BFV keypair (public, secret, relinearization,
    /// Galois) under `params`. The caller (the key vault) is responsible
    /// for persisting the returned bytes.
    #[tracing::instrument(skip_all)]
    pub fn generate_keypair(params: &FheParameters) -> SealResult<GeneratedKeys> {
        let ctx = SealContext::build(params)?;
        let keygen = KeyGenerator::new(&ctx.context).map_err(|e| SealError::internal(format!("key generation failed: {e}")))?;

        let secret_key = keygen.secret_key();
        let public_key = keygen
            .create_public_key()
            .map_err(|e| SealError::internal(format!("public key generation failed: {e}")))?;
        let relin_keys = keygen
            .create_relinearization_keys()
            .map_err(|e| SealError::internal(format!("relinearization key generation failed: {e}")))?;
        let galois_keys = keygen
            .create_galois_keys()
            .map_err(|e| SealError::internal(format!("galois key generation failed: {e}")))?;

        Ok(GeneratedKeys {
            public_key: to_bytes(&public_key)?,
            secret_key: to_bytes(&secret_key)?,
            relin_keys: to_bytes(&relin_keys)?,
            galois_keys: to_bytes(&galois_keys)?,
        })
    }

    /// Builds a full engine (can encrypt, decrypt, and compare) from raw
    /// (uncompressed) key bytes.
    pub fn new_full(
        params: FheParameters,
        public_key_bytes: &[u8],
        secret_key_bytes: &[u8],
        relin_key_bytes: &[u8],
        galois_key_bytes: &[u8],
    ) -> SealResult<Self> {
        let ctx = SealContext::build(&params)?;
        let public_key = PublicKey::from_bytes(&ctx.context, public_key_bytes)
            .map_err(|e| SealError::internal(format!("malformed public key: {e}")))?;
        let secret_key = SecretKey::from_bytes(&ctx.context, secret_key_bytes)
            .map_err(|e| SealError::internal(format!("malformed secret key: {e}")))?;
        let relin_keys = RelinearizationKeys::from_bytes(&ctx.context, relin_key_bytes)
            .map_err(|e| SealError::internal(format!("malformed relinearization keys: {e}")))?;
        let galois_keys = GaloisKeys::from_bytes(&ctx.context, galois_key_bytes)
            .map_err(|e| SealError::internal(format!("malformed galois keys: {e}")))?;

        let encoder = BFVEncoder::new(&ctx.context).map_err(|e| SealError::internal(e.to_string()))?;
        let evaluator = BFVEvaluator::new(&ctx.context).map_err(|e| SealError::internal(e.to_string()))?;
        let encryptor = Encryptor::with_public_and_secret_key(&ctx.context, &public_key, &secret_key)
            .map_err(|e| SealError::internal(format!("failed to build encryptor: {e}")))?;
        let decryptor =
            Decryptor::new(&ctx.context, &secret_key).map_err(|e| SealError::internal(format!("failed to build decryptor: {e}")))?;

        Ok(Engine::Full {
            ctx,
            params,
            encoder,
            evaluator,
            encryptor,
            decryptor,
            relin_keys,
            galois_keys,
            cache: ComparisonCache::new(),
        })
    }

    /// Builds an encrypt-only engine (no secret key material at all) from
    /// raw public key bytes.
    pub fn new_encrypt_only(params: FheParameters, public_key_bytes: &[u8]) -> SealResult<Self> {
        let ctx = SealContext::build(&params)?;
        let public_key =
            PublicKey::from_bytes(&ctx.context, public_key_bytes).map_err(|e| SealError::internal(format!("malformed public key: {e}")))?;

        let encoder = BFVEncoder::new(&ctx.context).map_err(|e| SealError::internal(e.to_string()))?;
        let encryptor =
            Encryptor::with_public_key(&ctx.context, &public_key).map_err(|e| SealError::internal(format!("failed to build encryptor: {e}")))?;

        Ok(Engine::EncryptOnly {
            ctx,
            params,
            encoder,
            encryptor,
        })
    }

    fn context(&self) -> &SealContext {
        match self {
            Engine::Full { ctx, .. } => ctx,
            Engine::EncryptOnly { ctx, .. } => ctx,
        }
    }

    fn encoder(&self) -> &BFVEncoder {
        match self {
            Engine::Full { encoder, .. } => encoder,
            Engine::EncryptOnly { encoder, .. } => encoder,
        }
    }

    fn encryptor(&self) -> &Encryptor {
        match self {
            Engine::Full { encryptor, .. } => encryptor,
            Engine::EncryptOnly { encryptor, .. } => encryptor,
        }
    }

    pub fn params(&self) -> &FheParameters {
        match self {
            Engine::Full { params, .. } => params,
            Engine::EncryptOnly { params, .. } => params,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Engine::Full { .. })
    }

    fn encode_int(&self, v: u64) -> SealResult<Plaintext> {
        if v >= self.params().plain_modulus {
            return Err(SealError::encode_range(format!(
                "{v} is not representable under plaintext modulus {}",
                self.params().plain_modulus
            )));
        }
        let slot_count = self.encoder().slot_count();
        let mut slots = vec![0u64; slot_count];
        slots[0] = v;
        let mut plaintext = Plaintext::new().map_err(|e| SealError::internal(e.to_string()))?;
        self.encoder()
            .encode_unsigned(&slots, &mut plaintext)
            .map_err(|e| SealError::internal(format!("batch encode failed: {e}")))?;
        Ok(plaintext)
    }

    fn decode_int(&self, plaintext: &Plaintext) -> SealResult<u64> {
        let slots = self
            .encoder()
            .decode_unsigned(plaintext)
            .map_err(|e| SealError::internal(format!("batch decode failed: {e}")))?;
        slots.first().copied().ok_or_else(|| SealError::internal("decoded plaintext has no slots"))
    }

    /// Encrypts `v` into slot 0 of a batched plaintext (all other slots
    /// zero) and returns the zstd-compressed ciphertext bytes. Valid in
    /// either mode.
    #[tracing::instrument(skip(self))]
    pub fn encrypt_int(&self, v: u64) -> SealResult<CiphertextBytes> {
        let plaintext = self.encode_int(v)?;
        let ciphertext = self
            .encryptor()
            .encrypt(&plaintext)
            .map_err(|e| SealError::internal(format!("BFV encryption failed: {e}")))?;
        compress_ciphertext(&ciphertext)
    }

    /// Decrypts a ciphertext produced by [`Engine::encrypt_int`]. Requires
    /// [`Engine::Full`]; an encrypt-only engine returns [`SealError::ModeError`].
    #[tracing::instrument(skip(self, ct))]
    pub fn decrypt_int(&self, ct: &[u8]) -> SealResult<u64> {
        let (decryptor, ctx) = self.require_full()?;
        let ciphertext = decompress_ciphertext(&ctx.context, ct)?;
        let plaintext = decryptor
            .decrypt(&ciphertext)
            .map_err(|e| SealError::internal(format!("BFV decryption failed: {e}")))?;
        self.decode_int(&plaintext)
    }

    /// Encrypts a string as its ordered UTF-8 code units, each independently
    /// encrypted by [`Engine::encrypt_int`]. The sequence length leaks.
    pub fn encrypt_string(&self, s: &str) -> SealResult<Vec<CiphertextBytes>> {
        s.as_bytes().iter().map(|&byte| self.encrypt_int(byte as u64)).collect()
    }

    /// Decrypts a list produced by [`Engine::encrypt_string`], position-wise.
    pub fn decrypt_string(&self, cts: &[CiphertextBytes]) -> SealResult<String> {
        let bytes: SealResult<Vec<u8>> = cts
            .iter()
            .map(|ct| {
                let v = self.decrypt_int(ct)?;
                u8::try_from(v).map_err(|_| SealError::internal(format!("decrypted code unit {v} does not fit in a byte")))
            })
            .collect();
        String::from_utf8(bytes?).map_err(|e| SealError::internal(format!("decrypted string is not valid UTF-8: {e}")))
    }

    /// Splits `v` into `bits` LSB-first bits and encrypts each
    /// independently. `v` must lie in `[0, 2^bits)`.
    pub fn encrypt_for_range_query(&self, v: u64, bits: u32) -> SealResult<Vec<CiphertextBytes>> {
        if bits > 0 && v >= (1u64 << bits) {
            return Err(SealError::encode_range(format!("{v} does not fit in {bits} bits")));
        }
        (0..bits).map(|i| self.encrypt_int((v >> i) & 1)).collect()
    }

    /// Homomorphic equality: decides whether `ct` encrypts `v` without
    /// decrypting `ct` itself -- only the squared difference is decrypted.
    /// Requires [`Engine::Full`].
    #[tracing::instrument(skip(self, ct))]
    pub fn compare_encrypted(&self, ct: &[u8], v: u64) -> SealResult<bool> {
        let (evaluator, decryptor, relin_keys, ctx, cache) = self.require_full_compare()?;
        let cache_key = cache::key("eq", ct, &v.to_string());
        if let Some(hit) = cache.get(&cache_key) {
            return Ok(hit);
        }

        let ciphertext = decompress_ciphertext(&ctx.context, ct)?;
        let v_plain = self.encode_int(v)?;

        let diff = evaluator
            .sub_plain(&ciphertext, &v_plain)
            .map_err(|e| SealError::internal(format!("homomorphic subtraction failed: {e}")))?;
        let squared = evaluator
            .multiply(&diff, &diff)
            .map_err(|e| SealError::internal(format!("homomorphic squaring failed: {e}")))?;
        let squared = evaluator
            .relinearize(&squared, relin_keys)
            .map_err(|e| SealError::internal(format!("relinearization failed: {e}")))?;

        ensure_noise_budget(decryptor, &squared)?;
        let plaintext = decryptor
            .decrypt(&squared)
            .map_err(|e| SealError::internal(format!("BFV decryption failed: {e}")))?;
        let matches = self.decode_int(&plaintext)? == 0;

        cache.put(cache_key, matches);
        Ok(matches)
    }

    /// Decides `x < q` where `enc_bits` encrypts the LSB-first bits of
    /// unknown `x` and `q` is a plaintext bound. Requires [`Engine::Full`].
    pub fn compare_less_than(&self, enc_bits: &[CiphertextBytes], q: u64) -> SealResult<bool> {
        compare::less_than(self, enc_bits, q)
    }

    /// Decides `x > q`. Requires [`Engine::Full`].
    pub fn compare_greater_than(&self, enc_bits: &[CiphertextBytes], q: u64) -> SealResult<bool> {
        compare::greater_than(self, enc_bits, q)
    }

    /// Decides `(lo.is_none() || x >= lo) && (hi.is_none() || x <= hi)`.
    /// Both bounds `None` yields `true` without any homomorphic work.
    /// Requires [`Engine::Full`].
    pub fn compare_range(&self, enc_bits: &[CiphertextBytes], lo: Option<u64>, hi: Option<u64>) -> SealResult<bool> {
        compare::range(self, enc_bits, lo, hi)
    }

    /// Empties the internal comparison memo. Safe to call at any time;
    /// callers must treat cache presence as an unobservable performance
    /// hint, never as part of correctness.
    pub fn clear_cache(&self) {
        if let Engine::Full { cache, .. } = self {
            cache.clear();
        }
    }

    pub(crate) fn evaluator(&self) -> SealResult<&BFVEvaluator> {
        match self {
            Engine::Full { evaluator, .. } => Ok(evaluator),
            Engine::EncryptOnly { .. } => Err(SealError::ModeError),
        }
    }

    pub(crate) fn relin_keys(&self) -> SealResult<&RelinearizationKeys> {
        match self {
            Engine::Full { relin_keys, .. } => Ok(relin_keys),
            Engine::EncryptOnly { .. } => Err(SealError::ModeError),
        }
    }

    pub(crate) fn decryptor(&self) -> SealResult<&Decryptor> {
        match self {
            Engine::Full { decryptor, .. } => Ok(decryptor),
            Engine::EncryptOnly { .. } => Err(SealError::ModeError),
        }
    }

    fn require_full(&self) -> SealResult<(&Decryptor, &SealContext)> {
        match self {
            Engine::Full { decryptor, ctx, .. } => Ok((decryptor, ctx)),
            Engine::EncryptOnly { .. } => Err(SealError::ModeError),
        }
    }

    #[allow(clippy::type_complexity)]
    fn require_full_compare(&self) -> SealResult<(&BFVEvaluator, &Decryptor, &RelinearizationKeys, &SealContext, &ComparisonCache)> {
        match self {
            Engine::Full {
                evaluator,
                decryptor,
                relin_keys,
                ctx,
                cache,
                ..
            } => Ok((evaluator, decryptor, relin_keys, ctx, cache)),
            Engine::EncryptOnly { .. } => Err(SealError::ModeError),
        }
    }
}

fn to_bytes<T: ToBytes>(value: &T) -> SealResult<Vec<u8>> {
    value.as_bytes().map_err(|e| SealError::internal(format!("serialization failed: {e}")))
}

fn compress_ciphertext(ciphertext: &Ciphertext) -> SealResult<CiphertextBytes> {
    let raw = to_bytes(ciphertext)?;
    zstd::bulk::compress(&raw, ZSTD_LEVEL).map_err(|e| SealError::internal(format!("ciphertext compression failed: {e}")))
}

pub(crate) fn decompress_ciphertext(ctx: &sealy::Context, compressed: &[u8]) -> SealResult<Ciphertext> {
    let raw = zstd::bulk::decompress(compressed, 64 * 1024 * 1024)
        .map_err(|e| SealError::internal(format!("ciphertext decompression failed: {e}")))?;
    Ciphertext::from_bytes(ctx, &raw).map_err(|e| SealError::internal(format!("malformed ciphertext: {e}")))
}

/// Checks SEAL's invariant noise budget before a final decrypt. This is the
/// noise-budget assertion the design recommends but does not mandate: the
/// bitwise comparator's multiplicative depth grows with the bit width, and
/// whether it stays inside budget for a given `coeff_modulus_bits` chain is
/// a property of the chosen parameters, not something checkable statically.
pub(crate) fn ensure_noise_budget(decryptor: &Decryptor, ct: &Ciphertext) -> SealResult<()> {
    let budget = decryptor
        .invariant_noise_budget(ct)
        .map_err(|e| SealError::internal(format!("noise budget query failed: {e}")))?;
    if budget <= 0 {
        return Err(SealError::crypto_capacity(format!(
            "BFV noise budget exhausted ({budget} bits remaining) before final decryption"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_params() -> FheParameters {
        FheParameters::default()
    }

    fn full_engine() -> Engine {
        let params = test_params();
        let keys = Engine::generate_keypair(&params).unwrap();
        Engine::new_full(params, &keys.public_key, &keys.secret_key, &keys.relin_keys, &keys.galois_keys).unwrap()
    }

    #[test]
    fn int_round_trip() {
        let engine = full_engine();
        let ct = engine.encrypt_int(12345).unwrap();
        assert_eq!(engine.decrypt_int(&ct).unwrap(), 12345);
    }

    #[test]
    fn string_round_trip() {
        let engine = full_engine();
        let ct = engine.encrypt_string("hello").unwrap();
        assert_eq!(engine.decrypt_string(&ct).unwrap(), "hello");
    }

    #[test]
    fn out_of_range_integer_is_encode_range_error() {
        let engine = full_engine();
        let too_big = test_params().plain_modulus;
        assert!(matches!(engine.encrypt_int(too_big), Err(SealError::EncodeRange(_))));
    }

    #[test]
    fn compare_encrypted_matches_equal_values_only() {
        let engine = full_engine();
        let ct = engine.encrypt_int(42).unwrap();
        assert!(engine.compare_encrypted(&ct, 42).unwrap());
        assert!(!engine.compare_encrypted(&ct, 43).unwrap());
    }

    #[test]
    fn encrypt_only_engine_cannot_decrypt() {
        let params = test_params();
        let keys = Engine::generate_keypair(&params).unwrap();
        let engine = Engine::new_encrypt_only(params, &keys.public_key).unwrap();
        let ct = engine.encrypt_int(7).unwrap();
        assert_eq!(engine.decrypt_int(&ct), Err(SealError::ModeError));
    }

    #[test]
    fn range_query_rejects_values_outside_declared_width() {
        let engine = full_engine();
        assert!(matches!(engine.encrypt_for_range_query(256, 8), Err(SealError::EncodeRange(_))));
        assert!(engine.encrypt_for_range_query(255, 8).is_ok());
    }

    #[test]
    fn bitwise_comparator_decides_less_and_greater_than() {
        let engine = full_engine();
        let bits = engine.encrypt_for_range_query(20, 8).unwrap();
        assert!(engine.compare_less_than(&bits, 30).unwrap());
        assert!(!engine.compare_less_than(&bits, 10).unwrap());
        assert!(engine.compare_greater_than(&bits, 10).unwrap());
        assert!(!engine.compare_greater_than(&bits, 30).unwrap());
    }

    #[test]
    fn range_comparison_honors_optional_bounds() {
        let engine = full_engine();
        let bits = engine.encrypt_for_range_query(20, 8).unwrap();
        assert!(engine.compare_range(&bits, Some(15), Some(25)).unwrap());
        assert!(!engine.compare_range(&bits, Some(21), None).unwrap());
        assert!(engine.compare_range(&bits, None, None).unwrap());
    }

    #[test]
    fn clear_cache_does_not_change_comparison_outcome() {
        let engine = full_engine();
        let ct = engine.encrypt_int(9).unwrap();
        assert!(engine.compare_encrypted(&ct, 9).unwrap());
        engine.clear_cache();
        assert!(engine.compare_encrypted(&ct, 9).unwrap());
    }
}

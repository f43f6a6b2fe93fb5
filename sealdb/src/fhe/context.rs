// /////////////////////////////////////////////////////////////////////////////
// sealdb
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # BFV context construction
//!
//! Builds the `sealy` (Microsoft SEAL) context and key material from a
//! [`FheParameters`] value. Isolated in its own module so the rest of the
//! engine talks to a small surface (`Context`, `BFVEncoder`, keys) instead
//! of repeating parameter plumbing at every call site.

use sealdb_domain::{FheParameters, SealError, SealResult};
use sealy::{CoefficientModulus, Context, EncryptionParameters, Modulus, PlainModulus, SchemeType, SecurityLevel};

/// Everything derived from [`FheParameters`] that the engine needs besides
/// the keys themselves.
pub struct SealContext {
    pub context: Context,
}

impl SealContext {
    pub fn build(params: &FheParameters) -> SealResult<Self> {
        let degree = params.poly_modulus_degree;

        let coeff_modulus: Vec<Modulus> = CoefficientModulus::create(degree, &params.coeff_modulus_bits)
            .map_err(|e| SealError::internal(format!("failed to build coefficient modulus chain: {e}")))?;

        let plain_modulus = Modulus::new(params.plain_modulus)
            .map_err(|e| SealError::internal(format!("invalid plaintext modulus: {e}")))?;
        // The design requires a batching-capable plaintext modulus; fail
        // loudly at construction rather than silently falling back to
        // non-batch encoding, which the spec forbids outright.
        let _ = PlainModulus::batching(degree, 20)
            .map_err(|e| SealError::internal(format!("plaintext modulus does not support batching: {e}")))?;

        let encryption_parameters = EncryptionParameters::new(SchemeType::Bfv)
            .map_err(|e| SealError::internal(e.to_string()))?
            .set_poly_modulus_degree(degree)
            .set_coefficient_modulus(coeff_modulus)
            .set_plain_modulus(plain_modulus);

        let context = Context::new(&encryption_parameters, true, SecurityLevel::TC128)
            .map_err(|e| SealError::internal(format!("failed to build BFV context: {e}")))?;

        Ok(Self { context })
    }
}

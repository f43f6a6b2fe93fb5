// /////////////////////////////////////////////////////////////////////////////
// sealdb
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Bitwise homomorphic comparator: the textbook MSB-down algorithm that
//! maintains running "equal-so-far" and "greater-so-far" ciphertexts over
//! BFV-encrypted bits, using only additions and multiplications (each
//! ciphertext-ciphertext multiply followed by relinearization). Only the
//! final Boolean ciphertext is ever decrypted.

use sealdb_domain::{SealError, SealResult};
use sealy::Ciphertext;

use super::{decompress_ciphertext, ensure_noise_budget, CiphertextBytes, Engine};

/// Runs the bit-serial comparator of `enc_bits` (LSB-first ciphertext bits
/// of unknown `x`) against plaintext `q`, returning `(x < q, x == q, x > q)`.
fn evaluate(engine: &Engine, enc_bits: &[CiphertextBytes], q: u64) -> SealResult<(bool, bool, bool)> {
    let evaluator = engine.evaluator()?;
    let relin_keys = engine.relin_keys()?;
    let decryptor = engine.decryptor()?;
    let ctx = &engine.context().context;

    let bits = enc_bits.len() as u32;
    if bits > 0 && q >= (1u64 << bits) {
        return Err(SealError::encode_range(format!("comparison bound {q} does not fit in {bits} bits")));
    }

    let zero = engine.encrypt_int(0)?;
    let one = engine.encrypt_int(1)?;

    // `gt` accumulates whether x is already known to be greater than q from
    // a more significant bit; `eq` tracks whether all more significant bits
    // examined so far are equal.
    let mut gt = decompress_ciphertext(ctx, &zero)?;
    let mut eq = decompress_ciphertext(ctx, &one)?;

    for i in (0..enc_bits.len()).rev() {
        let xi = decompress_ciphertext(ctx, &enc_bits[i])?;
        let qi = (q >> i) & 1 == 1;

        // term_gt = xi AND NOT(qi): xi when qi is 0, the zero ciphertext when qi is 1.
        let term_gt = if qi { zero_like(engine, evaluator, &xi)? } else { xi.clone() };

        let mul = evaluator
            .multiply(&eq, &term_gt)
            .map_err(|e| SealError::internal(format!("comparator multiply failed: {e}")))?;
        let mul = evaluator
            .relinearize(&mul, relin_keys)
            .map_err(|e| SealError::internal(format!("comparator relinearize failed: {e}")))?;
        gt = evaluator
            .add(&gt, &mul)
            .map_err(|e| SealError::internal(format!("comparator add failed: {e}")))?;

        // xnor_i = xi when qi is 1, (1 - xi) otherwise.
        let xnor_i = if qi {
            xi
        } else {
            let negated = evaluator.negate(&xi).map_err(|e| SealError::internal(format!("comparator negate failed: {e}")))?;
            add_constant_one(engine, evaluator, &negated)?
        };

        let eq_mul = evaluator
            .multiply(&eq, &xnor_i)
            .map_err(|e| SealError::internal(format!("comparator multiply failed: {e}")))?;
        eq = evaluator
            .relinearize(&eq_mul, relin_keys)
            .map_err(|e| SealError::internal(format!("comparator relinearize failed: {e}")))?;
    }

    // lt = 1 - gt - eq: x is neither greater than nor equal to q.
    let sum = evaluator
        .add(&gt, &eq)
        .map_err(|e| SealError::internal(format!("comparator add failed: {e}")))?;
    let negated_sum = evaluator.negate(&sum).map_err(|e| SealError::internal(format!("comparator negate failed: {e}")))?;
    let lt = add_constant_one(engine, evaluator, &negated_sum)?;

    ensure_noise_budget(decryptor, &gt)?;
    ensure_noise_budget(decryptor, &eq)?;
    ensure_noise_budget(decryptor, &lt)?;

    let gt_bool = decrypt_bit(engine, decryptor, &gt)?;
    let eq_bool = decrypt_bit(engine, decryptor, &eq)?;
    let lt_bool = decrypt_bit(engine, decryptor, &lt)?;

    Ok((lt_bool, eq_bool, gt_bool))
}

fn zero_like(engine: &Engine, evaluator: &sealy::BFVEvaluator, ct: &Ciphertext) -> SealResult<Ciphertext> {
    let zero_plain = engine.encode_int(0)?;
    evaluator
        .multiply_plain(ct, &zero_plain)
        .map_err(|e| SealError::internal(format!("comparator zeroing failed: {e}")))
}

fn add_constant_one(engine: &Engine, evaluator: &sealy::BFVEvaluator, ct: &Ciphertext) -> SealResult<Ciphertext> {
    let one_plain = engine.encode_int(1)?;
    evaluator.add_plain(ct, &one_plain).map_err(|e| SealError::internal(format!("comparator add_plain failed: {e}")))
}

fn decrypt_bit(engine: &Engine, decryptor: &sealy::Decryptor, ct: &Ciphertext) -> SealResult<bool> {
    let plaintext = decryptor.decrypt(ct).map_err(|e| SealError::internal(format!("comparator decrypt failed: {e}")))?;
    Ok(engine.decode_int(&plaintext)? != 0)
}

pub fn less_than(engine: &Engine, enc_bits: &[CiphertextBytes], q: u64) -> SealResult<bool> {
    evaluate(engine, enc_bits, q).map(|(lt, _, _)| lt)
}

pub fn greater_than(engine: &Engine, enc_bits: &[CiphertextBytes], q: u64) -> SealResult<bool> {
    evaluate(engine, enc_bits, q).map(|(_, _, gt)| gt)
}

pub fn range(engine: &Engine, enc_bits: &[CiphertextBytes], lo: Option<u64>, hi: Option<u64>) -> SealResult<bool> {
    if lo.is_none() && hi.is_none() {
        return Ok(true);
    }
    let mut within = true;
    if let Some(lo) = lo {
        let (lt, _, _) = evaluate(engine, enc_bits, lo)?;
        within &= !lt; // x >= lo  <=>  !(x < lo)
    }
    if let Some(hi) = hi {
        let (_, _, gt) = evaluate(engine, enc_bits, hi)?;
        within &= !gt; // x <= hi  <=>  !(x > hi)
    }
    Ok(within)
}

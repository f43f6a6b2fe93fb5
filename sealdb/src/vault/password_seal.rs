// /////////////////////////////////////////////////////////////////////////////
// sealdb
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Password-sealed at-rest codec
//!
//! The bit-exact keyfile layout from the external interface contract:
//! `salt(16) || IV(16) || AES-CBC-PKCS7(AES256 key, KEK)`, where
//! `KEK = PBKDF2-HMAC-SHA256(password, salt, 100_000, 32)`. Used both for
//! the AES master keyfile and, when a password is supplied, for the BFV
//! secret key file.

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use pbkdf2::pbkdf2_hmac;
use rand_core::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use sealdb_domain::{SealError, SensitiveBytes};

pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = 16;
const KEK_LEN: usize = 32;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Derives the KEK into a zeroizing buffer -- the derived key is sensitive
/// material that must not linger unzeroized once `seal`/`unseal` are done
/// with it (§5 "Resource scoping").
fn derive_kek(password: &str, salt: &[u8], iterations: u32) -> Zeroizing<[u8; KEK_LEN]> {
    let mut kek = Zeroizing::new([0u8; KEK_LEN]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut *kek);
    kek
}

/// Encrypts `plaintext` under a key derived from `password`, returning
/// `salt || iv || ciphertext`.
pub fn seal(password: &str, iterations: u32, plaintext: &[u8]) -> Vec<u8> {
    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    rand::thread_rng().fill_bytes(&mut iv);

    let kek = derive_kek(password, &salt, iterations);
    let ciphertext = Aes256CbcEnc::new(&(*kek).into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut sealed = Vec::with_capacity(SALT_LEN + IV_LEN + ciphertext.len());
    sealed.extend_from_slice(&salt);
    sealed.extend_from_slice(&iv);
    sealed.extend_from_slice(&ciphertext);
    sealed
}

/// Decrypts a blob produced by [`seal`]. Padding or authentication failure
/// (there is no authentication tag in CBC; "failure" here means invalid
/// PKCS7 padding, the closest signal this primitive can give) surfaces as
/// [`SealError::KeyAuthFail`], indistinguishable from a correct-looking but
/// wrong password. The plaintext is key material in transit, so it is
/// returned wrapped in [`SensitiveBytes`] rather than a bare `Vec<u8>` --
/// zeroized on drop once the caller is done with it.
pub fn unseal(password: &str, iterations: u32, sealed: &[u8]) -> Result<SensitiveBytes, SealError> {
    if sealed.len() < SALT_LEN + IV_LEN {
        return Err(SealError::KeyAuthFail);
    }
    let (salt, rest) = sealed.split_at(SALT_LEN);
    let (iv, ciphertext) = rest.split_at(IV_LEN);

    let kek = derive_kek(password, salt, iterations);
    let plaintext = Aes256CbcDec::new(&(*kek).into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| SealError::KeyAuthFail)?;
    Ok(SensitiveBytes::new(plaintext))
}

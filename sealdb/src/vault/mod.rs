// /////////////////////////////////////////////////////////////////////////////
// sealdb
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Key Vault (C1)
//!
//! Manages the on-disk layout of key material: context parameters, BFV
//! public/secret/relinearization/Galois keys, the AES master key, and a
//! `backups/` subdirectory. Every write goes through [`atomic::write_atomic`]
//! (temp file, fsync, rename), so a crash never leaves a half-written
//! keyfile behind.

mod atomic;
mod password_seal;

use std::path::{Path, PathBuf};

use chrono::Utc;
use sealdb_domain::{AesMasterKey, SealError, SealResult, SensitiveBytes, VaultConfig};

const PUBLIC_KEY_FILE: &str = "fhe_public.key";
const SECRET_KEY_FILE: &str = "fhe_secret.key";
const RELIN_KEY_FILE: &str = "fhe_relin.key";
const GALOIS_KEY_FILE: &str = "fhe_galois.key";
const AES_KEY_FILE: &str = "aes.key";

/// File-backed store of AES and BFV key material.
///
/// # Ownership
/// The vault exclusively owns the files under `config.keys_dir`. It never
/// holds decoded key *objects* in memory -- that is the homomorphic index
/// engine's job; the vault only moves bytes to and from disk.
pub struct KeyVault {
    config: VaultConfig,
}

impl KeyVault {
    pub fn new(config: VaultConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn public_key_file(&self) -> PathBuf {
        self.config.keys_dir.join(PUBLIC_KEY_FILE)
    }

    pub fn secret_key_file(&self) -> PathBuf {
        self.config.keys_dir.join(SECRET_KEY_FILE)
    }

    pub fn relin_key_file(&self) -> PathBuf {
        self.config.keys_dir.join(RELIN_KEY_FILE)
    }

    pub fn galois_key_file(&self) -> PathBuf {
        self.config.keys_dir.join(GALOIS_KEY_FILE)
    }

    pub fn aes_key_file(&self) -> PathBuf {
        self.config.keys_dir.join(AES_KEY_FILE)
    }

    // -- AES master key -----------------------------------------------------

    /// Derives a KEK from `password` with a fresh salt and the vault's
    /// fixed PBKDF2 iteration count, encrypts `key` under it with
    /// AES-CBC-PKCS7, and writes `salt || IV || ciphertext` atomically.
    #[tracing::instrument(skip(self, key, password))]
    pub fn save_aes_key(&self, key: &AesMasterKey, password: &str) -> SealResult<()> {
        let sealed = password_seal::seal(password, self.config.pbkdf2_iterations, key.as_bytes());
        atomic::write_atomic(&self.aes_key_file(), &sealed)
    }

    /// Parses `salt || IV || ciphertext`, re-derives the KEK, and decrypts.
    /// Fails with [`SealError::KeyAuthFail`] on wrong password or corrupt
    /// padding.
    #[tracing::instrument(skip(self, password))]
    pub fn load_aes_key(&self, password: &str) -> SealResult<AesMasterKey> {
        let sealed = atomic::read_required(&self.aes_key_file())?;
        let plain = password_seal::unseal(password, self.config.pbkdf2_iterations, &sealed)?;
        AesMasterKey::from_bytes(plain.into_vec())
            .ok_or_else(|| SealError::internal("decrypted AES key has the wrong length"))
    }

    // -- BFV keys -------------------------------------------------------------

    /// Writes `bytes`, zstd-compressed at the vault's configured level, to
    /// an auxiliary (non-secret) key file -- used for the public key, the
    /// relinearization key, and the Galois key, none of which are sealed
    /// with a password.
    fn save_aux_key(&self, bytes: &[u8], file: &Path) -> SealResult<()> {
        let compressed =
            zstd::bulk::compress(bytes, self.config.zstd_level).map_err(|e| SealError::io_fail(e.to_string()))?;
        atomic::write_atomic(file, &compressed)
    }

    fn load_aux_key(&self, file: &Path) -> SealResult<Vec<u8>> {
        let compressed = atomic::read_required(file)?;
        zstd::bulk::decompress(&compressed, 64 * 1024 * 1024).map_err(|e| SealError::io_fail(e.to_string()))
    }

    pub fn save_fhe_public_key(&self, bytes: &[u8]) -> SealResult<()> {
        self.save_aux_key(bytes, &self.public_key_file())
    }

    pub fn load_fhe_public_key(&self) -> SealResult<Vec<u8>> {
        self.load_aux_key(&self.public_key_file())
    }

    pub fn save_fhe_relin_key(&self, bytes: &[u8]) -> SealResult<()> {
        self.save_aux_key(bytes, &self.relin_key_file())
    }

    pub fn load_fhe_relin_key(&self) -> SealResult<Vec<u8>> {
        self.load_aux_key(&self.relin_key_file())
    }

    pub fn save_fhe_galois_key(&self, bytes: &[u8]) -> SealResult<()> {
        self.save_aux_key(bytes, &self.galois_key_file())
    }

    pub fn load_fhe_galois_key(&self) -> SealResult<Vec<u8>> {
        self.load_aux_key(&self.galois_key_file())
    }

    /// Zstd-compresses the secret key bytes; if `password` is given, the
    /// compressed blob is then sealed exactly like the AES keyfile. If
    /// not, the compressed bytes are written directly (unsealed-secret
    /// mode, for operators who accept the at-rest exposure).
    #[tracing::instrument(skip(self, sec_bytes, password))]
    pub fn save_fhe_secret_key(&self, sec_bytes: &[u8], password: Option<&str>) -> SealResult<()> {
        let compressed =
            zstd::bulk::compress(sec_bytes, self.config.zstd_level).map_err(|e| SealError::io_fail(e.to_string()))?;
        let on_disk = match password {
            Some(pw) => password_seal::seal(pw, self.config.pbkdf2_iterations, &compressed),
            None => compressed,
        };
        atomic::write_atomic(&self.secret_key_file(), &on_disk)
    }

    #[tracing::instrument(skip(self, password))]
    pub fn load_fhe_secret_key(&self, password: Option<&str>) -> SealResult<Vec<u8>> {
        let on_disk = atomic::read_required(&self.secret_key_file())?;
        let compressed: SensitiveBytes = match password {
            Some(pw) => password_seal::unseal(pw, self.config.pbkdf2_iterations, &on_disk)?,
            None => SensitiveBytes::new(on_disk),
        };
        zstd::bulk::decompress(compressed.as_slice(), 64 * 1024 * 1024).map_err(|e| SealError::io_fail(e.to_string()))
    }

    /// Saves both halves of a BFV keypair in one call.
    pub fn save_fhe_keys(&self, pub_bytes: &[u8], sec_bytes: &[u8], password: Option<&str>) -> SealResult<()> {
        self.save_fhe_public_key(pub_bytes)?;
        self.save_fhe_secret_key(sec_bytes, password)
    }

    /// Atomic rotation sequence: (i) move the existing public/secret key
    /// files into `backups/`, renamed with a `YYYYMMDD_HHMMSS` suffix;
    /// (ii) save the new keys. If step (ii) fails, the backups remain and
    /// the new-key slot is left absent; the caller recovers via
    /// [`KeyVault::restore_backup`].
    #[tracing::instrument(skip(self, new_pub_bytes, new_sec_bytes, password))]
    pub fn rotate_fhe_keys(
        &self,
        new_pub_bytes: &[u8],
        new_sec_bytes: &[u8],
        password: Option<&str>,
    ) -> SealResult<(PathBuf, PathBuf)> {
        std::fs::create_dir_all(self.config.backups_dir())?;
        let suffix = Utc::now().format("%Y%m%d_%H%M%S").to_string();

        let pub_backup = self.config.backups_dir().join(format!("{PUBLIC_KEY_FILE}_{suffix}"));
        let sec_backup = self.config.backups_dir().join(format!("{SECRET_KEY_FILE}_{suffix}"));

        if self.public_key_file().exists() {
            std::fs::rename(self.public_key_file(), &pub_backup)?;
        }
        if self.secret_key_file().exists() {
            std::fs::rename(self.secret_key_file(), &sec_backup)?;
        }

        self.save_fhe_keys(new_pub_bytes, new_sec_bytes, password)?;
        Ok((pub_backup, sec_backup))
    }

    // -- Backup / restore -----------------------------------------------------

    /// Produces a gzip-compressed tar archive of the entire keys directory
    /// at `backup_dir/keys_backup_<timestamp>.tar.gz` and returns its path.
    #[tracing::instrument(skip(self))]
    pub fn generate_backup(&self, backup_dir: Option<&Path>) -> SealResult<PathBuf> {
        let backup_dir = backup_dir.map(Path::to_path_buf).unwrap_or_else(|| self.config.keys_dir.clone());
        std::fs::create_dir_all(&backup_dir)?;

        let suffix = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let archive_path = backup_dir.join(format!("keys_backup_{suffix}.tar.gz"));

        let tar_gz = std::fs::File::create(&archive_path)?;
        let encoder = flate2::write::GzEncoder::new(tar_gz, flate2::Compression::default());
        let mut archive = tar::Builder::new(encoder);
        archive
            .append_dir_all(".", &self.config.keys_dir)
            .map_err(|e| SealError::io_fail(e.to_string()))?;
        archive.into_inner().map_err(|e| SealError::io_fail(e.to_string()))?.finish().map_err(|e| SealError::io_fail(e.to_string()))?;

        Ok(archive_path)
    }

    /// Extracts `file` over the keys directory, overwriting its contents.
    /// If `password` is given, verifies it can decrypt the AES key after
    /// extraction; on failure, rolls the directory back to its prior
    /// contents and fails with [`SealError::KeyAuthFail`].
    #[tracing::instrument(skip(self, password))]
    pub fn restore_backup(&self, file: &Path, password: Option<&str>) -> SealResult<()> {
        let pre_restore = snapshot_dir(&self.config.keys_dir)?;

        std::fs::create_dir_all(&self.config.keys_dir)?;
        let tar_gz = std::fs::File::open(file)?;
        let decoder = flate2::read::GzDecoder::new(tar_gz);
        let mut archive = tar::Archive::new(decoder);
        archive
            .unpack(&self.config.keys_dir)
            .map_err(|e| SealError::io_fail(e.to_string()))?;

        if let Some(pw) = password {
            if self.load_aes_key(pw).is_err() {
                restore_snapshot(&self.config.keys_dir, pre_restore)?;
                return Err(SealError::KeyAuthFail);
            }
        }
        Ok(())
    }
}

/// In-memory snapshot of a directory's files, used to roll back a failed
/// restore. Good enough for a keys directory (a handful of small files);
/// not meant for large trees.
fn snapshot_dir(dir: &Path) -> SealResult<Vec<(PathBuf, Vec<u8>)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut snapshot = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            snapshot.push((entry.path(), std::fs::read(entry.path())?));
        }
    }
    Ok(snapshot)
}

fn restore_snapshot(dir: &Path, snapshot: Vec<(PathBuf, Vec<u8>)>) -> SealResult<()> {
    if snapshot.is_empty() {
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        return Ok(());
    }

    let known: std::collections::HashSet<&PathBuf> = snapshot.iter().map(|(path, _)| path).collect();
    if dir.exists() {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() && !known.contains(&entry.path()) {
                std::fs::remove_file(entry.path())?;
            }
        }
    }

    for (path, contents) in snapshot {
        atomic::write_atomic(&path, &contents)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn vault(dir: &Path) -> KeyVault {
        let mut config = VaultConfig::new(dir);
        config.pbkdf2_iterations = 1_000; // cheap for tests
        KeyVault::new(config)
    }

    #[test]
    fn aes_key_round_trips_under_correct_password() {
        let dir = tempdir().unwrap();
        let vault = vault(dir.path());
        let key = AesMasterKey::from_bytes(vec![3u8; 32]).unwrap();
        vault.save_aes_key(&key, "hunter2").unwrap();
        let loaded = vault.load_aes_key("hunter2").unwrap();
        assert_eq!(loaded.as_bytes(), key.as_bytes());
    }

    #[test]
    fn aes_key_wrong_password_fails() {
        let dir = tempdir().unwrap();
        let vault = vault(dir.path());
        let key = AesMasterKey::from_bytes(vec![3u8; 32]).unwrap();
        vault.save_aes_key(&key, "hunter2").unwrap();
        assert_eq!(vault.load_aes_key("wrong"), Err(SealError::KeyAuthFail));
    }

    #[test]
    fn fhe_public_key_round_trips_unsealed() {
        let dir = tempdir().unwrap();
        let vault = vault(dir.path());
        vault.save_fhe_public_key(b"public key bytes").unwrap();
        assert_eq!(vault.load_fhe_public_key().unwrap(), b"public key bytes");
    }

    #[test]
    fn fhe_secret_key_round_trips_sealed() {
        let dir = tempdir().unwrap();
        let vault = vault(dir.path());
        vault.save_fhe_secret_key(b"secret key bytes", Some("pw")).unwrap();
        assert_eq!(vault.load_fhe_secret_key(Some("pw")).unwrap(), b"secret key bytes");
    }

    #[test]
    fn fhe_secret_key_round_trips_unsealed_when_no_password() {
        let dir = tempdir().unwrap();
        let vault = vault(dir.path());
        vault.save_fhe_secret_key(b"secret key bytes", None).unwrap();
        assert_eq!(vault.load_fhe_secret_key(None).unwrap(), b"secret key bytes");
    }

    #[test]
    fn rotation_backs_up_old_keys_with_timestamp_suffix() {
        let dir = tempdir().unwrap();
        let vault = vault(dir.path());
        vault.save_fhe_keys(b"old pub", b"old sec", None).unwrap();

        let (pub_backup, _sec_backup) = vault.rotate_fhe_keys(b"new pub", b"new sec", None).unwrap();

        assert!(pub_backup.exists());
        let backed_up = vault.load_aux_key(&pub_backup).unwrap();
        assert_eq!(backed_up, b"old pub");
        assert_eq!(vault.load_fhe_public_key().unwrap(), b"new pub");
    }

    #[test]
    fn backup_then_restore_round_trips_keys_directory() {
        let src_dir = tempdir().unwrap();
        let vault = vault(src_dir.path());
        let key = AesMasterKey::from_bytes(vec![5u8; 32]).unwrap();
        vault.save_aes_key(&key, "pw").unwrap();
        vault.save_fhe_public_key(b"pub").unwrap();

        let backup_dir = tempdir().unwrap();
        let archive = vault.generate_backup(Some(backup_dir.path())).unwrap();
        assert!(archive.file_name().unwrap().to_string_lossy().starts_with("keys_backup_"));

        let dest_dir = tempdir().unwrap();
        let dest_vault = vault(dest_dir.path());
        dest_vault.restore_backup(&archive, Some("pw")).unwrap();

        assert_eq!(dest_vault.load_aes_key("pw").unwrap().as_bytes(), key.as_bytes());
        assert_eq!(dest_vault.load_fhe_public_key().unwrap(), b"pub");
    }

    #[test]
    fn restore_with_wrong_password_rolls_back() {
        let src_dir = tempdir().unwrap();
        let vault = vault(src_dir.path());
        let key = AesMasterKey::from_bytes(vec![5u8; 32]).unwrap();
        vault.save_aes_key(&key, "pw").unwrap();
        let archive = vault.generate_backup(None).unwrap();

        let dest_dir = tempdir().unwrap();
        let dest_vault = vault(dest_dir.path());
        let preexisting_key = AesMasterKey::from_bytes(vec![9u8; 32]).unwrap();
        dest_vault.save_aes_key(&preexisting_key, "original-pw").unwrap();

        let result = dest_vault.restore_backup(&archive, Some("wrong-pw"));
        assert_eq!(result, Err(SealError::KeyAuthFail));

        // Prior directory contents are restored.
        assert_eq!(dest_vault.load_aes_key("original-pw").unwrap().as_bytes(), preexisting_key.as_bytes());
    }
}

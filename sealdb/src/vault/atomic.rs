// /////////////////////////////////////////////////////////////////////////////
// sealdb
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Atomic file writes: write to a sibling temp path, fsync, then rename
//! over the destination. A crash or concurrent reader never observes a
//! half-written keyfile.

use sealdb_domain::{SealError, SealResult};
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub fn write_atomic(path: &Path, contents: &[u8]) -> SealResult<()> {
    let dir = path.parent().ok_or_else(|| SealError::internal("keyfile path has no parent directory"))?;
    std::fs::create_dir_all(dir)?;

    let tmp_path = sibling_temp_path(path);
    {
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(contents)?;
        tmp_file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

pub fn read_required(path: &Path) -> SealResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SealError::not_found(path.display().to_string()),
        _ => SealError::io_fail(e.to_string()),
    })
}

fn sibling_temp_path(path: &Path) -> std::path::PathBuf {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("tmp");
    path.with_file_name(format!(".{file_name}.tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("file.bin");
        write_atomic(&path, b"payload").unwrap();
        assert_eq!(read_required(&path).unwrap(), b"payload");
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.bin");
        assert_eq!(read_required(&path), Err(SealError::not_found(path.display().to_string())));
    }

    #[test]
    fn temp_file_is_not_left_behind_after_a_successful_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.bin");
        write_atomic(&path, b"payload").unwrap();
        assert!(!sibling_temp_path(&path).exists());
    }
}

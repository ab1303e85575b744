//! Atomic file writes.
//!
//! Every byte copy this crate makes into a live location (downloads into the
//! todo directory, cache mirror refreshes) goes through [`atomic_write`]:
//!
//! 1. Ensure the parent directory exists.
//! 2. Write to `<path>.todosync.tmp`.
//! 3. Rename to the final path (atomic on POSIX), truncating any old file.
//! 4. On rename failure remove the `.tmp` and leave the original intact.

use std::path::{Path, PathBuf};

use crate::error::{io_err, SyncError};

/// Suffix of in-flight temporary files. Never matches the `.todo` suffix.
pub const TMP_SUFFIX: &str = ".todosync.tmp";

/// Atomically replace `path` with `bytes`.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), SyncError> {
    let tmp = PathBuf::from(format!("{}{}", path.display(), TMP_SUFFIX));
    atomic_write_with_tmp(path, bytes, &tmp)
}

fn atomic_write_with_tmp(path: &Path, bytes: &[u8], tmp: &Path) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    if let Some(tmp_parent) = tmp.parent() {
        std::fs::create_dir_all(tmp_parent).map_err(|e| io_err(tmp_parent, e))?;
    }
    std::fs::write(tmp, bytes).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    tracing::debug!("wrote: {}", path.display());
    Ok(())
}

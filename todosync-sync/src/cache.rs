//! Cache mirror: per-cycle byte copies of both sides.
//!
//! ```text
//! <backup_dir>/.cache/
//!   local/<name>     copy of the local file
//!   dropbox/<name>   fresh download of the remote object
//! ```
//!
//! Contents never outlive a cycle: callers [`CacheMirror::clear`] after
//! deciding, and again on shutdown.

use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;

use todosync_core::{remote_path, FileName, RemoteStore};

use crate::error::{io_err, SyncError};
use crate::writer::atomic_write;

/// Result of comparing the two cached copies of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheVerdict {
    Identical,
    Differs,
    LocalOnly,
    RemoteOnly,
    Neither,
}

#[derive(Debug, Clone)]
pub struct CacheMirror {
    root: PathBuf,
}

impl CacheMirror {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn local_path(&self, name: &FileName) -> PathBuf {
        self.root.join("local").join(name.as_str())
    }

    pub fn remote_path(&self, name: &FileName) -> PathBuf {
        self.root.join("dropbox").join(name.as_str())
    }

    /// Copy local bytes and download remote bytes for every name, then
    /// compare the cached pairs.
    ///
    /// A remote object that cannot be fetched, for any reason, leaves the
    /// remote copy absent.
    pub fn refresh<'n>(
        &self,
        names: impl IntoIterator<Item = &'n FileName>,
        todo_dir: &Path,
        store: &dyn RemoteStore,
        folder: &str,
    ) -> Result<BTreeMap<FileName, CacheVerdict>, SyncError> {
        let names: BTreeSet<&FileName> = names.into_iter().collect();
        let mut verdicts = BTreeMap::new();
        for name in names {
            let source = todo_dir.join(name.as_str());
            match std::fs::read(&source) {
                Ok(bytes) => atomic_write(&self.local_path(name), &bytes)?,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    remove_if_present(&self.local_path(name))?
                }
                Err(err) => return Err(io_err(&source, err)),
            }

            match store.download(&remote_path(folder, name.as_str())) {
                Ok(Some(bytes)) => atomic_write(&self.remote_path(name), &bytes)?,
                Ok(None) => remove_if_present(&self.remote_path(name))?,
                Err(err) => {
                    tracing::warn!("cache: cannot fetch remote {}: {}", name, err);
                    remove_if_present(&self.remote_path(name))?;
                }
            }

            verdicts.insert(name.clone(), self.verdict(name)?);
        }
        Ok(verdicts)
    }

    /// Byte-compare the cached copies of `name`.
    pub fn verdict(&self, name: &FileName) -> Result<CacheVerdict, SyncError> {
        let local = read_optional(&self.local_path(name))?;
        let remote = read_optional(&self.remote_path(name))?;
        Ok(match (local, remote) {
            (Some(l), Some(r)) if l == r => CacheVerdict::Identical,
            (Some(_), Some(_)) => CacheVerdict::Differs,
            (Some(_), None) => CacheVerdict::LocalOnly,
            (None, Some(_)) => CacheVerdict::RemoteOnly,
            (None, None) => CacheVerdict::Neither,
        })
    }

    /// Remove every cached copy, including in-flight temporaries.
    pub fn clear(&self) -> Result<(), SyncError> {
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(&self.root, err)),
        }
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, SyncError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}

fn remove_if_present(path: &Path) -> Result<(), SyncError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(path, err)),
    }
}

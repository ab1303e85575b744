//! Snapshot listers, one per side, behind [`SnapshotSource`].
//!
//! Only names accepted by [`is_todo_name`] are recorded; every other entry
//! (directories, other extensions, in-flight temporaries) is skipped.

use std::io::ErrorKind;
use std::path::Path;

use todosync_core::{
    is_todo_name, ClockNormalizer, EntryTag, FileRecord, RemoteStore, Side, Snapshot,
};

use crate::content::hash_file;
use crate::error::{io_err, SyncError};

/// Something that can produce a fresh [`Snapshot`] of one side.
pub trait SnapshotSource {
    fn side(&self) -> Side;

    fn snapshot(&self) -> Result<Snapshot, SyncError>;
}

// ---------------------------------------------------------------------------
// Local
// ---------------------------------------------------------------------------

/// Lists a flat local directory. Records carry a content digest.
pub struct LocalLister<'a> {
    dir: &'a Path,
    clock: ClockNormalizer,
}

impl<'a> LocalLister<'a> {
    pub fn new(dir: &'a Path, clock: ClockNormalizer) -> Self {
        Self { dir, clock }
    }
}

impl SnapshotSource for LocalLister<'_> {
    fn side(&self) -> Side {
        Side::Local
    }

    fn snapshot(&self) -> Result<Snapshot, SyncError> {
        let entries = std::fs::read_dir(self.dir).map_err(|e| io_err(self.dir, e))?;
        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(self.dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_todo_name(&name) {
                continue;
            }
            let path = entry.path();
            // A file removed between read_dir and stat is simply absent.
            let meta = match std::fs::metadata(&path) {
                Ok(meta) => meta,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(io_err(&path, err)),
            };
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().map_err(|e| io_err(&path, e))?;
            let Some(digest) = hash_file(&path)? else {
                continue;
            };
            records.push(
                FileRecord::new(name, meta.len(), self.clock.local_from_system(modified))
                    .with_digest(digest),
            );
        }
        Ok(Snapshot::from_records(Side::Local, records))
    }
}

// ---------------------------------------------------------------------------
// Remote
// ---------------------------------------------------------------------------

/// Lists the remote folder through a [`RemoteStore`].
pub struct RemoteLister<'a> {
    store: &'a dyn RemoteStore,
    folder: &'a str,
    clock: ClockNormalizer,
}

impl<'a> RemoteLister<'a> {
    pub fn new(store: &'a dyn RemoteStore, folder: &'a str, clock: ClockNormalizer) -> Self {
        Self {
            store,
            folder,
            clock,
        }
    }
}

impl SnapshotSource for RemoteLister<'_> {
    fn side(&self) -> Side {
        Side::Remote
    }

    /// Any listing failure maps to [`SyncError::ListUnavailable`].
    fn snapshot(&self) -> Result<Snapshot, SyncError> {
        let entries =
            self.store
                .list_folder(self.folder)
                .map_err(|source| SyncError::ListUnavailable {
                    folder: self.folder.to_string(),
                    source,
                })?;

        let mut records = Vec::new();
        for entry in entries {
            if entry.tag != EntryTag::File || !is_todo_name(&entry.name) {
                continue;
            }
            let stamp = match self.clock.normalize(&entry.server_modified, Side::Remote) {
                Ok(stamp) => stamp,
                Err(err) => {
                    tracing::warn!("skipping remote entry {}: {}", entry.name, err);
                    continue;
                }
            };
            let mut record = FileRecord::new(entry.name, entry.size, stamp);
            record.digest = entry.content_hash;
            records.push(record);
        }
        Ok(Snapshot::from_records(Side::Remote, records))
    }
}

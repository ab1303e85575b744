//! The remote object store contract.
//!
//! Three operations: list a folder, upload bytes with overwrite, download
//! bytes. The HTTP implementation lives in `todosync-dropbox`;
//! [`MemoryStore`] is an in-process implementation used by tests and by
//! offline dry runs.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

/// Kind of a listed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryTag {
    File,
    Folder,
    Deleted,
}

/// One entry returned by [`RemoteStore::list_folder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub tag: EntryTag,
    pub name: String,
    pub size: u64,
    /// Server-side modification instant, `YYYY-MM-DDTHH:MM:SSZ`.
    pub server_modified: String,
    pub content_hash: Option<String>,
}

/// A remote object store holding a flat namespace of files.
pub trait RemoteStore: Send + Sync {
    /// List the entries directly under `folder`.
    fn list_folder(&self, folder: &str) -> Result<Vec<RemoteEntry>, RemoteError>;

    /// Store `bytes` at `path`, overwriting any existing object.
    fn upload(&self, path: &str, bytes: &[u8]) -> Result<(), RemoteError>;

    /// Fetch the bytes at `path`; `Ok(None)` when no such object exists.
    fn download(&self, path: &str) -> Result<Option<Vec<u8>>, RemoteError>;
}

/// `<folder>/<name>` with exactly one separator.
pub fn remote_path(folder: &str, name: &str) -> String {
    format!("{}/{}", folder.trim_end_matches('/'), name)
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    server_modified: String,
    content_hash: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: BTreeMap<String, StoredObject>,
    listing_fails: bool,
    failing_paths: Vec<String>,
    uploads: Vec<String>,
    downloads: Vec<String>,
}

/// Thread-safe in-memory [`RemoteStore`].
///
/// Uploads are stamped with a fixed `server_modified` value that callers
/// can change with [`MemoryStore::set_clock`].
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    clock: Mutex<String>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            clock: Mutex::new("2024-01-01T00:00:00Z".to_string()),
        }
    }

    /// Set the `server_modified` value stamped on subsequent uploads.
    pub fn set_clock(&self, server_modified: &str) {
        *lock(&self.clock) = server_modified.to_string();
    }

    /// Insert an object directly, bypassing upload bookkeeping.
    pub fn insert(&self, path: &str, bytes: &[u8], server_modified: &str) {
        self.insert_with_hash(path, bytes, server_modified, None);
    }

    /// Insert an object with an explicit content hash.
    pub fn insert_with_hash(
        &self,
        path: &str,
        bytes: &[u8],
        server_modified: &str,
        content_hash: Option<String>,
    ) {
        lock(&self.state).objects.insert(
            path.to_string(),
            StoredObject {
                bytes: bytes.to_vec(),
                server_modified: server_modified.to_string(),
                content_hash,
            },
        );
    }

    /// Make every subsequent `list_folder` call fail with a 409 status.
    pub fn fail_listing(&self, fail: bool) {
        lock(&self.state).listing_fails = fail;
    }

    /// Make uploads and downloads of `path` fail with a 503 status.
    pub fn fail_path(&self, path: &str) {
        lock(&self.state).failing_paths.push(path.to_string());
    }

    pub fn bytes(&self, path: &str) -> Option<Vec<u8>> {
        lock(&self.state).objects.get(path).map(|o| o.bytes.clone())
    }

    /// Paths uploaded so far, in call order.
    pub fn uploads(&self) -> Vec<String> {
        lock(&self.state).uploads.clone()
    }

    /// Paths downloaded so far, in call order.
    pub fn downloads(&self) -> Vec<String> {
        lock(&self.state).downloads.clone()
    }
}

impl RemoteStore for MemoryStore {
    fn list_folder(&self, folder: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let state = lock(&self.state);
        if state.listing_fails {
            return Err(RemoteError::Status {
                code: 409,
                message: format!("path/not_found/ {folder}"),
            });
        }
        let prefix = format!("{}/", folder.trim_end_matches('/'));
        Ok(state
            .objects
            .iter()
            .filter_map(|(path, object)| {
                let name = path.strip_prefix(&prefix)?;
                if name.contains('/') {
                    return None;
                }
                Some(RemoteEntry {
                    tag: EntryTag::File,
                    name: name.to_string(),
                    size: object.bytes.len() as u64,
                    server_modified: object.server_modified.clone(),
                    content_hash: object.content_hash.clone(),
                })
            })
            .collect())
    }

    fn upload(&self, path: &str, bytes: &[u8]) -> Result<(), RemoteError> {
        let server_modified = lock(&self.clock).clone();
        let mut state = lock(&self.state);
        if state.failing_paths.iter().any(|p| p == path) {
            return Err(RemoteError::Status {
                code: 503,
                message: "service unavailable".to_string(),
            });
        }
        state.uploads.push(path.to_string());
        state.objects.insert(
            path.to_string(),
            StoredObject {
                bytes: bytes.to_vec(),
                server_modified,
                content_hash: None,
            },
        );
        Ok(())
    }

    fn download(&self, path: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        let mut state = lock(&self.state);
        if state.failing_paths.iter().any(|p| p == path) {
            return Err(RemoteError::Status {
                code: 503,
                message: "service unavailable".to_string(),
            });
        }
        state.downloads.push(path.to_string());
        Ok(state.objects.get(path).map(|o| o.bytes.clone()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

//! Transfer executor: performs planned uploads and downloads.
//!
//! Each transfer reports its own [`TransferOutcome`]; a failure never stops
//! the remaining transfers and is never retried within the cycle. The next
//! cycle re-derives the same decision from fresh snapshots.

use std::io::ErrorKind;
use std::path::Path;

use serde::Serialize;

use todosync_core::{remote_path, Action, FileName, RemoteStore};

use crate::reconcile::Plan;
use crate::writer::atomic_write;

/// Per-file result of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransferOutcome {
    Uploaded { name: FileName, bytes: u64 },
    Downloaded { name: FileName, bytes: u64 },
    Failed { action: Action, error: String },
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, TransferOutcome::Failed { .. })
    }
}

pub struct TransferExecutor<'a> {
    store: &'a dyn RemoteStore,
    todo_dir: &'a Path,
    remote_folder: &'a str,
}

impl<'a> TransferExecutor<'a> {
    pub fn new(store: &'a dyn RemoteStore, todo_dir: &'a Path, remote_folder: &'a str) -> Self {
        Self {
            store,
            todo_dir,
            remote_folder,
        }
    }

    /// Send the full local content of `name` to `<remote_folder>/<name>`,
    /// overwriting whatever is there.
    pub fn upload(&self, name: &FileName) -> TransferOutcome {
        let source = self.todo_dir.join(name.as_str());
        let failed = |error: String| TransferOutcome::Failed {
            action: Action::Upload(name.clone()),
            error,
        };
        let bytes = match std::fs::read(&source) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return failed("no longer present locally".to_string())
            }
            Err(err) => return failed(format!("cannot read {}: {}", source.display(), err)),
        };
        match self
            .store
            .upload(&remote_path(self.remote_folder, name.as_str()), &bytes)
        {
            Ok(()) => {
                tracing::info!("uploaded {} ({} bytes)", name, bytes.len());
                TransferOutcome::Uploaded {
                    name: name.clone(),
                    bytes: bytes.len() as u64,
                }
            }
            Err(err) => {
                tracing::warn!("upload of {} failed: {}", name, err);
                failed(err.to_string())
            }
        }
    }

    /// Fetch `name` and write it verbatim to `destination`, replacing any
    /// existing file.
    pub fn download(&self, name: &FileName, destination: &Path) -> TransferOutcome {
        let failed = |error: String| TransferOutcome::Failed {
            action: Action::Download(name.clone()),
            error,
        };
        let bytes = match self
            .store
            .download(&remote_path(self.remote_folder, name.as_str()))
        {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return failed("not found on remote".to_string()),
            Err(err) => {
                tracing::warn!("download of {} failed: {}", name, err);
                return failed(err.to_string());
            }
        };
        if let Err(err) = atomic_write(destination, &bytes) {
            return failed(err.to_string());
        }
        tracing::info!("downloaded {} ({} bytes)", name, bytes.len());
        TransferOutcome::Downloaded {
            name: name.clone(),
            bytes: bytes.len() as u64,
        }
    }

    /// Run every upload, then every download, in `plan`.
    pub fn execute(&self, plan: &Plan) -> Vec<TransferOutcome> {
        let uploads = plan.to_upload().into_iter().map(|name| self.upload(&name));
        let downloads = plan
            .to_download()
            .into_iter()
            .map(|name| self.download(&name, &self.todo_dir.join(name.as_str())));
        uploads.chain(downloads).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use todosync_core::MemoryStore;

    #[test]
    fn upload_overwrites_remote() {
        let todo = TempDir::new().unwrap();
        fs::write(todo.path().join("a.todo"), "new").unwrap();
        let store = MemoryStore::new();
        store.insert("/todos/a.todo", b"old", "2024-01-01T00:00:00Z");

        let outcome = TransferExecutor::new(&store, todo.path(), "/todos").upload(&"a.todo".into());
        assert_eq!(
            outcome,
            TransferOutcome::Uploaded {
                name: "a.todo".into(),
                bytes: 3
            }
        );
        assert_eq!(store.bytes("/todos/a.todo").unwrap(), b"new");
    }

    #[test]
    fn upload_of_vanished_file_fails_softly() {
        let todo = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let outcome = TransferExecutor::new(&store, todo.path(), "/todos").upload(&"a.todo".into());
        assert!(!outcome.is_success());
        assert!(store.uploads().is_empty());
    }

    #[test]
    fn download_truncates_destination() {
        let todo = TempDir::new().unwrap();
        let dest = todo.path().join("a.todo");
        fs::write(&dest, "a much longer local body").unwrap();
        let store = MemoryStore::new();
        store.insert("/todos/a.todo", b"short", "2024-01-01T00:00:00Z");

        let outcome =
            TransferExecutor::new(&store, todo.path(), "/todos").download(&"a.todo".into(), &dest);
        assert!(outcome.is_success());
        assert_eq!(fs::read(&dest).unwrap(), b"short");
    }

    #[test]
    fn failed_transfer_reports_its_action() {
        let todo = TempDir::new().unwrap();
        fs::write(todo.path().join("a.todo"), "x").unwrap();
        let store = MemoryStore::new();
        store.fail_path("/todos/a.todo");

        let executor = TransferExecutor::new(&store, todo.path(), "/todos");
        match executor.upload(&"a.todo".into()) {
            TransferOutcome::Failed { action, error } => {
                assert_eq!(action, Action::Upload("a.todo".into()));
                assert!(error.contains("503"), "got {error}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
        let missing = executor.download(&"b.todo".into(), &todo.path().join("b.todo"));
        assert!(!missing.is_success());
        assert!(!todo.path().join("b.todo").exists());
    }
}

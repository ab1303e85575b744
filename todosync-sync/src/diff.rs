//! Unified diff of the local and remote copy of one file, for `todosync diff`.

use std::io::ErrorKind;
use std::path::Path;

use similar::TextDiff;

use todosync_core::{remote_path, FileName, RemoteStore};

use crate::{error::io_err, SyncError};

/// Local vs remote content of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub name: FileName,
    pub local_exists: bool,
    pub remote_exists: bool,
    /// Empty when both sides hold the same text.
    pub unified_diff: String,
}

impl FileDiff {
    pub fn is_identical(&self) -> bool {
        self.unified_diff.is_empty()
    }
}

/// Compare `<todo_dir>/<name>` with `<folder>/<name>` on the remote.
///
/// A side that does not hold the file diffs as empty. No files are written.
pub fn diff_file(
    todo_dir: &Path,
    store: &dyn RemoteStore,
    folder: &str,
    name: &FileName,
) -> Result<FileDiff, SyncError> {
    let path = todo_dir.join(name.as_str());
    let local = match std::fs::read(&path) {
        Ok(bytes) => Some(bytes),
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => return Err(io_err(&path, err)),
    };
    let remote = store.download(&remote_path(folder, name.as_str()))?;

    let remote_text = text(remote.as_deref());
    let local_text = text(local.as_deref());
    let unified_diff = if remote_text == local_text {
        String::new()
    } else {
        TextDiff::from_lines(&remote_text, &local_text)
            .unified_diff()
            .header(&format!("remote/{name}"), &format!("local/{name}"))
            .context_radius(3)
            .to_string()
    };

    Ok(FileDiff {
        name: name.clone(),
        local_exists: local.is_some(),
        remote_exists: remote.is_some(),
        unified_diff,
    })
}

fn text(bytes: Option<&[u8]>) -> String {
    bytes
        .map(|b| String::from_utf8_lossy(b).replace("\r\n", "\n"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use todosync_core::MemoryStore;

    #[test]
    fn identical_content_has_no_diff() {
        let todo = TempDir::new().unwrap();
        fs::write(todo.path().join("a.todo"), "- one\r\n- two\r\n").unwrap();
        let store = MemoryStore::new();
        store.insert("/todos/a.todo", b"- one\n- two\n", "2024-01-01T00:00:00Z");

        let diff = diff_file(todo.path(), &store, "/todos", &"a.todo".into()).unwrap();
        assert!(diff.is_identical());
        assert!(diff.local_exists && diff.remote_exists);
    }

    #[test]
    fn changed_line_shows_in_unified_diff() {
        let todo = TempDir::new().unwrap();
        fs::write(todo.path().join("a.todo"), "- one\n- three\n").unwrap();
        let store = MemoryStore::new();
        store.insert("/todos/a.todo", b"- one\n- two\n", "2024-01-01T00:00:00Z");

        let diff = diff_file(todo.path(), &store, "/todos", &"a.todo".into()).unwrap();
        assert!(diff.unified_diff.contains("--- remote/a.todo"));
        assert!(diff.unified_diff.contains("+++ local/a.todo"));
        assert!(diff.unified_diff.contains("-- two"));
        assert!(diff.unified_diff.contains("+- three"));
    }

    #[test]
    fn missing_remote_diffs_against_empty() {
        let todo = TempDir::new().unwrap();
        fs::write(todo.path().join("a.todo"), "- new\n").unwrap();
        let diff = diff_file(todo.path(), &MemoryStore::new(), "/todos", &"a.todo".into()).unwrap();
        assert!(!diff.remote_exists);
        assert!(diff.unified_diff.contains("+- new"));
    }
}

//! Dated local backups.
//!
//! ```text
//! <backup_dir>/
//!   todos_bak-22_03_2020/   one folder per calendar day with a change
//!   todos_bak-23_03_2020/
//!   .cache/                 cache mirror (never a backup)
//! ```
//!
//! The first capture of a day copies every local `.todo` file; later
//! captures the same day copy only the changed files into the same folder.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;

use todosync_core::{is_todo_name, FileName, Snapshot};

use crate::content::hash_file;
use crate::error::{io_err, SyncError};

pub const FOLDER_PREFIX: &str = "todos_bak-";
const DATE_FORMAT: &str = "%d_%m_%Y";

/// `todos_bak-DD_MM_YYYY`
pub fn folder_name(date: NaiveDate) -> String {
    format!("{FOLDER_PREFIX}{}", date.format(DATE_FORMAT))
}

/// Inverse of [`folder_name`]; `None` for anything else.
pub fn parse_folder_name(name: &str) -> Option<NaiveDate> {
    let raw = name.strip_prefix(FOLDER_PREFIX)?;
    NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()
}

/// A dated backup folder on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupFolder {
    pub date: NaiveDate,
    pub path: PathBuf,
}

impl BackupFolder {
    /// `.todo` files held by this folder, sorted.
    pub fn files(&self) -> Result<Vec<FileName>, SyncError> {
        todo_names(&self.path)
    }
}

/// Every dated folder under `root`, oldest first. A missing root is empty.
pub fn list_backups(root: &Path) -> Result<Vec<BackupFolder>, SyncError> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(io_err(root, err)),
    };
    let mut folders = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(root, e))?;
        let Some(date) = parse_folder_name(&entry.file_name().to_string_lossy()) else {
            continue;
        };
        if entry.path().is_dir() {
            folders.push(BackupFolder {
                date,
                path: entry.path(),
            });
        }
    }
    folders.sort_by_key(|f| f.date);
    Ok(folders)
}

pub fn latest_backup(root: &Path) -> Result<Option<BackupFolder>, SyncError> {
    Ok(list_backups(root)?.pop())
}

/// Which files a capture copies.
#[derive(Debug, Clone, Copy)]
pub enum CaptureScope<'a> {
    All,
    Changed(&'a [FileName]),
}

/// What a capture did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureReport {
    pub folder: PathBuf,
    /// The day's folder did not exist before this capture.
    pub created: bool,
    pub copied: Vec<FileName>,
    pub failed: Vec<FileName>,
}

/// Copy local files into today's backup folder.
///
/// A file that vanished before it could be copied is skipped; any other
/// per-file copy error is logged and reported in `failed`.
pub fn capture(
    todo_dir: &Path,
    root: &Path,
    today: NaiveDate,
    scope: CaptureScope<'_>,
) -> Result<CaptureReport, SyncError> {
    let folder = root.join(folder_name(today));
    let created = !folder.is_dir();
    std::fs::create_dir_all(&folder).map_err(|e| io_err(&folder, e))?;

    let names = match scope {
        CaptureScope::Changed(names) if !created => names.to_vec(),
        _ => todo_names(todo_dir)?,
    };

    let mut copied = Vec::new();
    let mut failed = Vec::new();
    for name in names {
        let source = todo_dir.join(name.as_str());
        match std::fs::copy(&source, folder.join(name.as_str())) {
            Ok(_) => copied.push(name),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!("backup: {} vanished before copy", source.display());
            }
            Err(err) => {
                tracing::warn!("backup: cannot copy {}: {}", source.display(), err);
                failed.push(name);
            }
        }
    }

    if !copied.is_empty() {
        tracing::info!(
            "backed up {} file(s) into {}",
            copied.len(),
            folder.display()
        );
    }
    Ok(CaptureReport {
        folder,
        created,
        copied,
        failed,
    })
}

/// Whether `folder` holds an identical copy of every file in `local`.
pub fn matches_backup(folder: &BackupFolder, local: &Snapshot) -> Result<bool, SyncError> {
    for record in local.iter() {
        let path = folder.path.join(record.name.as_str());
        let meta = match std::fs::metadata(&path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(io_err(&path, err)),
        };
        if meta.len() != record.size {
            return Ok(false);
        }
        if let Some(digest) = &record.digest {
            if hash_file(&path)?.as_ref() != Some(digest) {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Startup consistency check: take a full capture unless the latest backup
/// already matches `local`. Returns the capture when one was taken.
pub fn ensure_consistent(
    todo_dir: &Path,
    root: &Path,
    today: NaiveDate,
    local: &Snapshot,
) -> Result<Option<CaptureReport>, SyncError> {
    let needs_capture = match latest_backup(root)? {
        None => !local.is_empty(),
        Some(folder) => !matches_backup(&folder, local)?,
    };
    if !needs_capture {
        return Ok(None);
    }
    capture(todo_dir, root, today, CaptureScope::All).map(Some)
}

fn todo_names(dir: &Path) -> Result<Vec<FileName>, SyncError> {
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_todo_name(&name) && entry.path().is_file() {
            names.push(FileName::from(name));
        }
    }
    names.sort();
    Ok(names)
}

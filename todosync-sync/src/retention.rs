//! Backup retention.
//!
//! A folder dated `today - N` days or earlier is deleted, non-recoverably.
//! One dated `today - N + 1` is kept.

use std::io::ErrorKind;
use std::path::Path;

use chrono::{Duration, NaiveDate};

use crate::backup::{list_backups, BackupFolder};
use crate::error::{io_err, SyncError};

/// Newest date that is already expired.
pub fn cutoff(today: NaiveDate, days: u32) -> NaiveDate {
    today - Duration::days(i64::from(days))
}

pub fn is_expired(date: NaiveDate, today: NaiveDate, days: u32) -> bool {
    date <= cutoff(today, days)
}

/// Delete every expired backup folder under `root`. Returns what was removed.
pub fn prune(root: &Path, today: NaiveDate, days: u32) -> Result<Vec<BackupFolder>, SyncError> {
    let mut removed = Vec::new();
    for folder in list_backups(root)? {
        if !is_expired(folder.date, today, days) {
            continue;
        }
        match std::fs::remove_dir_all(&folder.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(io_err(&folder.path, err)),
        }
        tracing::info!("pruned backup {}", folder.path.display());
        removed.push(folder);
    }
    Ok(removed)
}

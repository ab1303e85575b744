//! Domain types for todosync.
//!
//! A [`FileRecord`] is one `.todo` file as observed on one side at one
//! instant. A [`Snapshot`] is the full, name-ordered inventory of one side.
//! Both are immutable once built: every cycle produces fresh snapshots.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Sub;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// The only file extension any component recognises.
pub const TODO_SUFFIX: &str = ".todo";

/// Returns `true` if `name` is a tracked task file name.
///
/// The name must end with [`TODO_SUFFIX`] and have a non-empty stem.
pub fn is_todo_name(name: &str) -> bool {
    name.len() > TODO_SUFFIX.len() && name.ends_with(TODO_SUFFIX)
}

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed flat file name (no directory component).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileName(pub String);

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for FileName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for FileName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl FileName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A normalized wall-clock instant, comparable across both sides.
///
/// Produced only by [`crate::clock::ClockNormalizer`], which applies the
/// remote timezone correction, so two `Stamp`s can always be subtracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamp(pub NaiveDateTime);

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S"))
    }
}

impl Sub for Stamp {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.signed_duration_since(rhs.0)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which file set a snapshot was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Local,
    Remote,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Local => write!(f, "local"),
            Side::Remote => write!(f, "remote"),
        }
    }
}

/// A corrective action decided by the reconciliation engine.
///
/// Transient: produced each cycle, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "action", content = "name", rename_all = "snake_case")]
pub enum Action {
    Upload(FileName),
    Download(FileName),
    BackupLocally(FileName),
}

impl Action {
    pub fn name(&self) -> &FileName {
        match self {
            Action::Upload(name) | Action::Download(name) | Action::BackupLocally(name) => name,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Upload(name) => write!(f, "upload {name}"),
            Action::Download(name) => write!(f, "download {name}"),
            Action::BackupLocally(name) => write!(f, "backup {name}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// One task file as observed on one side at one snapshot instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub name: FileName,
    pub size: u64,
    pub modified_at: Stamp,
    /// Content hash when the side reports one (Dropbox content-hash format).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl FileRecord {
    pub fn new(name: impl Into<FileName>, size: u64, modified_at: Stamp) -> Self {
        Self {
            name: name.into(),
            size,
            modified_at,
            digest: None,
        }
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }
}

/// A name-ordered inventory of one side at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    side: Side,
    records: BTreeMap<FileName, FileRecord>,
}

impl Snapshot {
    /// An empty snapshot of `side`.
    pub fn empty(side: Side) -> Self {
        Self {
            side,
            records: BTreeMap::new(),
        }
    }

    /// Build a snapshot from records. Later duplicates of a name replace
    /// earlier ones.
    pub fn from_records(side: Side, records: impl IntoIterator<Item = FileRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.name.clone(), record))
            .collect();
        Self { side, records }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn get(&self, name: &FileName) -> Option<&FileRecord> {
        self.records.get(name)
    }

    pub fn contains(&self, name: &FileName) -> bool {
        self.records.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &FileName> {
        self.records.keys()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// A new snapshot equal to `self`, except that for every name in `names`
    /// the record is taken from `other` (or dropped if `other` lacks it).
    pub fn overlay(&self, other: &Snapshot, names: &[FileName]) -> Snapshot {
        let mut records = self.records.clone();
        for name in names {
            match other.get(name) {
                Some(record) => {
                    records.insert(name.clone(), record.clone());
                }
                None => {
                    records.remove(name);
                }
            }
        }
        Snapshot {
            side: self.side,
            records,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

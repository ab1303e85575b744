//! The reconciliation engine.
//!
//! Inputs are three snapshots: `previous` local (last cycle), `current`
//! local, and `remote` (absent when the listing failed). The output is a
//! [`Plan`] of backup, upload and download decisions, each with a [`Reason`].
//!
//! Decision order per file:
//!
//! 1. Local change (`previous` vs `current`) → `BackupLocally`.
//! 2. Local vs remote divergence → `Upload`. Local always wins; a divergent
//!    pair is never resolved by downloading.
//! 3. Remote-only names never observed locally → `Download`. Names that were
//!    local last cycle and are gone now stay on the remote untouched.
//!
//! An absent remote snapshot yields a skipped, empty plan.

use std::collections::BTreeMap;
use std::fmt;

use chrono::Duration;
use serde::Serialize;

use todosync_core::{Action, CompareMode, Config, FileName, FileRecord, Snapshot};

use crate::cache::CacheVerdict;

/// Comparison settings for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub mode: CompareMode,
    /// Band for `previous` vs `current` local timestamps.
    pub local_tolerance: Duration,
    /// Band for local vs remote timestamps.
    pub remote_tolerance: Duration,
}

impl Policy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            mode: config.comparison,
            local_tolerance: config.local_tolerance,
            remote_tolerance: config.remote_tolerance,
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            mode: CompareMode::default(),
            local_tolerance: Duration::minutes(2),
            remote_tolerance: Duration::minutes(4),
        }
    }
}

/// Why a decision was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    NewLocally,
    SizeChanged,
    TimestampMoved,
    ContentChanged,
    MissingRemotely,
    SizeDiffers,
    ContentDiffers,
    CacheDiffers,
    NewRemotely,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Reason::NewLocally => "new locally",
            Reason::SizeChanged => "size changed since last cycle",
            Reason::TimestampMoved => "modified since last cycle",
            Reason::ContentChanged => "content changed since last cycle",
            Reason::MissingRemotely => "missing on remote",
            Reason::SizeDiffers => "size differs from remote",
            Reason::ContentDiffers => "content differs from remote",
            Reason::CacheDiffers => "cached copies differ",
            Reason::NewRemotely => "new on remote",
        };
        f.write_str(text)
    }
}

/// One action together with its cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    #[serde(flatten)]
    pub action: Action,
    pub reason: Reason,
}

/// The outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    /// `true` when the remote snapshot was absent and nothing was decided.
    pub skipped: bool,
    pub decisions: Vec<Decision>,
    /// Deleted locally since the previous cycle but still present remotely.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub retained_remote: Vec<FileName>,
}

impl Plan {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    pub fn actions(&self) -> Vec<Action> {
        self.decisions.iter().map(|d| d.action.clone()).collect()
    }

    pub fn to_backup(&self) -> Vec<FileName> {
        self.names(|a| matches!(a, Action::BackupLocally(_)))
    }

    pub fn to_upload(&self) -> Vec<FileName> {
        self.names(|a| matches!(a, Action::Upload(_)))
    }

    pub fn to_download(&self) -> Vec<FileName> {
        self.names(|a| matches!(a, Action::Download(_)))
    }

    fn names(&self, keep: impl Fn(&Action) -> bool) -> Vec<FileName> {
        self.decisions
            .iter()
            .filter(|d| keep(&d.action))
            .map(|d| d.action.name().clone())
            .collect()
    }

    fn push(&mut self, action: Action, reason: Reason) {
        self.decisions.push(Decision { action, reason });
    }

    fn finish(mut self) -> Self {
        self.decisions.sort_by(|a, b| a.action.cmp(&b.action));
        self
    }
}

// ---------------------------------------------------------------------------
// Per-file rules
// ---------------------------------------------------------------------------

/// Has `current` changed since `previous`? `None` means unchanged.
pub fn local_change(
    previous: Option<&FileRecord>,
    current: &FileRecord,
    policy: &Policy,
) -> Option<Reason> {
    let Some(previous) = previous else {
        return Some(Reason::NewLocally);
    };
    if policy.mode != CompareMode::Metadata {
        if let Some(differ) = digests_differ(previous, current) {
            return differ.then_some(Reason::ContentChanged);
        }
    }
    if previous.size != current.size {
        return Some(Reason::SizeChanged);
    }
    let delta = magnitude(current.modified_at - previous.modified_at);
    if delta == Duration::zero() {
        return None;
    }
    if delta < policy.local_tolerance {
        // Timestamp jitter inside the band: only content can confirm a change.
        return match digests_differ(previous, current) {
            Some(true) => Some(Reason::ContentChanged),
            _ => None,
        };
    }
    Some(Reason::TimestampMoved)
}

/// Does `local` need uploading over `remote`? `None` means in sync.
pub fn divergence(
    local: &FileRecord,
    remote: Option<&FileRecord>,
    policy: &Policy,
) -> Option<Reason> {
    let Some(remote) = remote else {
        return Some(Reason::MissingRemotely);
    };
    if policy.mode != CompareMode::Metadata {
        if let Some(differ) = digests_differ(local, remote) {
            return differ.then_some(Reason::ContentDiffers);
        }
    }
    if magnitude(local.modified_at - remote.modified_at) < policy.remote_tolerance {
        return None;
    }
    match digests_differ(local, remote) {
        Some(differ) => differ.then_some(Reason::ContentDiffers),
        None => (local.size != remote.size).then_some(Reason::SizeDiffers),
    }
}

fn digests_differ(a: &FileRecord, b: &FileRecord) -> Option<bool> {
    match (&a.digest, &b.digest) {
        (Some(x), Some(y)) => Some(x != y),
        _ => None,
    }
}

fn magnitude(delta: Duration) -> Duration {
    if delta < Duration::zero() {
        -delta
    } else {
        delta
    }
}

// ---------------------------------------------------------------------------
// Whole-snapshot passes
// ---------------------------------------------------------------------------

/// Reconcile using snapshot metadata and digests.
pub fn reconcile(
    previous: &Snapshot,
    current: &Snapshot,
    remote: Option<&Snapshot>,
    policy: &Policy,
) -> Plan {
    let Some(remote) = remote else {
        return Plan::skipped();
    };
    let mut plan = Plan::default();
    push_local_changes(&mut plan, previous, current, policy);
    for local in current.iter() {
        if let Some(reason) = divergence(local, remote.get(&local.name), policy) {
            plan.push(Action::Upload(local.name.clone()), reason);
        }
    }
    push_remote_only(&mut plan, previous, current, remote);
    plan.finish()
}

/// Reconcile using freshly refreshed cache verdicts for the upload pass.
///
/// Local change detection and remote-only handling are the same as
/// [`reconcile`].
pub fn reconcile_cached(
    previous: &Snapshot,
    current: &Snapshot,
    remote: Option<&Snapshot>,
    verdicts: &BTreeMap<FileName, CacheVerdict>,
    policy: &Policy,
) -> Plan {
    let Some(remote) = remote else {
        return Plan::skipped();
    };
    let mut plan = Plan::default();
    push_local_changes(&mut plan, previous, current, policy);
    for (name, verdict) in verdicts {
        match verdict {
            CacheVerdict::Differs => plan.push(Action::Upload(name.clone()), Reason::CacheDiffers),
            CacheVerdict::LocalOnly => {
                plan.push(Action::Upload(name.clone()), Reason::MissingRemotely)
            }
            CacheVerdict::Identical | CacheVerdict::RemoteOnly | CacheVerdict::Neither => {}
        }
    }
    push_remote_only(&mut plan, previous, current, remote);
    plan.finish()
}

fn push_local_changes(plan: &mut Plan, previous: &Snapshot, current: &Snapshot, policy: &Policy) {
    for record in current.iter() {
        if let Some(reason) = local_change(previous.get(&record.name), record, policy) {
            plan.push(Action::BackupLocally(record.name.clone()), reason);
        }
    }
}

fn push_remote_only(plan: &mut Plan, previous: &Snapshot, current: &Snapshot, remote: &Snapshot) {
    for name in remote.names() {
        if current.contains(name) {
            continue;
        }
        if previous.contains(name) {
            plan.retained_remote.push(name.clone());
        } else {
            plan.push(Action::Download(name.clone()), Reason::NewRemotely);
        }
    }
}

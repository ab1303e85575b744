//! The bootstrap pass and the single reconciliation cycle.
//!
//! ```text
//! bootstrap:  create dirs → clear cache → list local → backup consistency
//!             check → prune → CycleState { previous_local = local }
//! cycle:      list local → list remote ─(unavailable)→ diagnostic, no-op
//!                              │
//!             decide → backup changed → transfers → prune → clear cache
//!             → advance previous_local
//! ```
//!
//! The only state carried between cycles is [`CycleState`], owned by the
//! caller and passed in by reference.

use std::collections::BTreeSet;
use std::time::Instant;

use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;

use todosync_core::{
    ClockNormalizer, CompareMode, Config, FileName, RemoteStore, Side, Snapshot,
};

use crate::backup::{self, BackupFolder, CaptureReport, CaptureScope};
use crate::cache::CacheMirror;
use crate::error::{io_err, SyncError};
use crate::executor::{TransferExecutor, TransferOutcome};
use crate::lister::{LocalLister, RemoteLister, SnapshotSource};
use crate::notify::Notifier;
use crate::reconcile::{reconcile, reconcile_cached, Plan, Policy};
use crate::retention;

/// Everything a cycle needs besides its state.
pub struct SyncEnv<'a> {
    pub config: &'a Config,
    pub store: &'a dyn RemoteStore,
    pub clock: ClockNormalizer,
    pub notifier: &'a dyn Notifier,
}

impl<'a> SyncEnv<'a> {
    pub fn new(config: &'a Config, store: &'a dyn RemoteStore, notifier: &'a dyn Notifier) -> Self {
        Self {
            config,
            store,
            clock: ClockNormalizer::from_offset_minutes(config.remote_utc_offset_minutes),
            notifier,
        }
    }

    pub fn with_clock(mut self, clock: ClockNormalizer) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> Policy {
        Policy::from_config(self.config)
    }

    pub fn cache(&self) -> CacheMirror {
        CacheMirror::new(self.config.cache_dir())
    }

    /// Mirror used by [`plan_cycle`], private to this process and separate
    /// from the one the agent's cycles refresh and clear.
    pub fn planning_cache(&self) -> CacheMirror {
        CacheMirror::new(
            self.config
                .backup_dir
                .join(format!(".cache.plan-{}", std::process::id())),
        )
    }

    pub fn local_snapshot(&self) -> Result<Snapshot, SyncError> {
        LocalLister::new(&self.config.todo_dir, self.clock).snapshot()
    }

    pub fn remote_snapshot(&self) -> Result<Snapshot, SyncError> {
        RemoteLister::new(self.store, &self.config.remote_folder, self.clock).snapshot()
    }
}

/// State the poll loop carries from one cycle to the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleState {
    pub previous_local: Snapshot,
    /// Cycles completed, skipped ones excluded.
    pub cycles: u64,
}

impl CycleState {
    pub fn new(previous_local: Snapshot) -> Self {
        Self {
            previous_local,
            cycles: 0,
        }
    }
}

impl Default for CycleState {
    fn default() -> Self {
        Self::new(Snapshot::empty(Side::Local))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BootstrapReport {
    pub local_files: usize,
    pub backup: Option<CaptureReport>,
    pub pruned: Vec<BackupFolder>,
}

/// What one cycle did.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Local>,
    pub duration_ms: u64,
    /// Set when the remote listing failed and the cycle did nothing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
    pub plan: Plan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<CaptureReport>,
    pub transfers: Vec<TransferOutcome>,
    pub pruned: Vec<BackupFolder>,
}

impl CycleReport {
    fn skipped(started_at: DateTime<Local>, started: Instant, reason: String) -> Self {
        Self {
            started_at,
            duration_ms: elapsed_ms(started),
            skipped: Some(reason),
            plan: Plan::skipped(),
            backup: None,
            transfers: Vec::new(),
            pruned: Vec::new(),
        }
    }

    /// Failed transfers plus failed backup copies.
    pub fn failures(&self) -> usize {
        let transfers = self.transfers.iter().filter(|t| !t.is_success()).count();
        let backups = self.backup.as_ref().map_or(0, |b| b.failed.len());
        transfers + backups
    }

    pub fn is_noop(&self) -> bool {
        self.plan.is_empty() && self.pruned.is_empty()
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        if let Some(reason) = &self.skipped {
            return format!("skipped: {reason}");
        }
        let count = |f: fn(&TransferOutcome) -> bool| self.transfers.iter().filter(|t| f(t)).count();
        format!(
            "{} uploaded, {} downloaded, {} backed up, {} pruned, {} failed",
            count(|t| matches!(t, TransferOutcome::Uploaded { .. })),
            count(|t| matches!(t, TransferOutcome::Downloaded { .. })),
            self.backup.as_ref().map_or(0, |b| b.copied.len()),
            self.pruned.len(),
            self.failures()
        )
    }
}

/// Prepare directories and backups before the first cycle.
///
/// Failure to create the todo or backup directory is fatal.
pub fn bootstrap(env: &SyncEnv<'_>, today: NaiveDate) -> Result<(CycleState, BootstrapReport), SyncError> {
    let config = env.config;
    for dir in [&config.todo_dir, &config.backup_dir] {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    env.cache().clear()?;

    let local = env.local_snapshot()?;
    let backup = backup::ensure_consistent(&config.todo_dir, &config.backup_dir, today, &local)?;
    let pruned = retention::prune(&config.backup_dir, today, config.retention_days)?;

    tracing::info!(
        "bootstrap: {} local file(s), initial backup {}, {} expired backup(s) pruned",
        local.len(),
        if backup.is_some() { "taken" } else { "up to date" },
        pruned.len()
    );
    let report = BootstrapReport {
        local_files: local.len(),
        backup,
        pruned,
    };
    Ok((CycleState::new(local), report))
}

/// Decide what a cycle would do, without doing it.
///
/// In cache mode this refreshes and then clears [`SyncEnv::planning_cache`],
/// never the cycle mirror, so it is safe while an agent is running.
pub fn plan_cycle(env: &SyncEnv<'_>, state: &CycleState) -> Result<Plan, SyncError> {
    let current = env.local_snapshot()?;
    match env.remote_snapshot() {
        Ok(remote) => decide(env, &env.planning_cache(), &state.previous_local, &current, &remote),
        Err(SyncError::ListUnavailable { .. }) => Ok(Plan::skipped()),
        Err(err) => Err(err),
    }
}

/// Run one full cycle and advance `state`.
///
/// An unavailable remote listing produces a skipped report, an operator
/// diagnostic, and leaves `state` untouched.
pub fn run_cycle(
    env: &SyncEnv<'_>,
    state: &mut CycleState,
    today: NaiveDate,
) -> Result<CycleReport, SyncError> {
    let started = Instant::now();
    let started_at = Local::now();
    let config = env.config;

    let current = env.local_snapshot()?;
    let remote = match env.remote_snapshot() {
        Ok(remote) => remote,
        Err(err @ SyncError::ListUnavailable { .. }) => {
            let folder = config.remote_folder.trim_start_matches('/');
            env.notifier.notify(
                "todosync",
                &format!("{err}. Create a \"{folder}\" folder in Dropbox; syncing resumes on the next cycle."),
            );
            return Ok(CycleReport::skipped(started_at, started, err.to_string()));
        }
        Err(err) => return Err(err),
    };

    let plan = decide(env, &env.cache(), &state.previous_local, &current, &remote)?;

    let changed = plan.to_backup();
    let backup = if changed.is_empty() {
        None
    } else {
        Some(backup::capture(
            &config.todo_dir,
            &config.backup_dir,
            today,
            CaptureScope::Changed(&changed),
        )?)
    };

    let transfers =
        TransferExecutor::new(env.store, &config.todo_dir, &config.remote_folder).execute(&plan);

    let pruned = match retention::prune(&config.backup_dir, today, config.retention_days) {
        Ok(pruned) => pruned,
        Err(err) => {
            tracing::warn!("retention: {}", err);
            Vec::new()
        }
    };
    if let Err(err) = env.cache().clear() {
        tracing::warn!("cache: {}", err);
    }

    state.previous_local = next_previous(env, &state.previous_local, current, backup.as_ref(), &transfers)?;
    state.cycles += 1;

    let report = CycleReport {
        started_at,
        duration_ms: elapsed_ms(started),
        skipped: None,
        plan,
        backup,
        transfers,
        pruned,
    };
    if !report.transfers.is_empty() {
        env.notifier.notify("todosync", &report.summary());
    }
    Ok(report)
}

fn decide(
    env: &SyncEnv<'_>,
    cache: &CacheMirror,
    previous: &Snapshot,
    current: &Snapshot,
    remote: &Snapshot,
) -> Result<Plan, SyncError> {
    let policy = env.policy();
    if policy.mode != CompareMode::Cache {
        return Ok(reconcile(previous, current, Some(remote), &policy));
    }
    let names: BTreeSet<&FileName> = current.names().chain(remote.names()).collect();
    let verdicts = cache.refresh(
        names,
        &env.config.todo_dir,
        env.store,
        &env.config.remote_folder,
    );
    let cleared = cache.clear();
    let verdicts = verdicts?;
    cleared?;
    Ok(reconcile_cached(previous, current, Some(remote), &verdicts, &policy))
}

/// `current`, except failed backups keep their previous record (so the
/// change is seen again) and downloads take their post-write record (so a
/// fresh download is not mistaken for a local edit).
fn next_previous(
    env: &SyncEnv<'_>,
    previous: &Snapshot,
    current: Snapshot,
    backup: Option<&CaptureReport>,
    transfers: &[TransferOutcome],
) -> Result<Snapshot, SyncError> {
    let mut next = current;
    if let Some(report) = backup {
        if !report.failed.is_empty() {
            next = next.overlay(previous, &report.failed);
        }
    }
    let downloaded: Vec<FileName> = transfers
        .iter()
        .filter_map(|t| match t {
            TransferOutcome::Downloaded { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect();
    if !downloaded.is_empty() {
        let after = env.local_snapshot()?;
        next = next.overlay(&after, &downloaded);
    }
    Ok(next)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

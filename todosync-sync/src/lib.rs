//! # todosync-sync
//!
//! Snapshot listing, reconciliation, and everything a single sync cycle does.
//!
//! Call [`cycle::bootstrap`] once, then [`cycle::run_cycle`] on every tick
//! with the returned [`CycleState`]. [`cycle::plan_cycle`] decides without
//! acting, for dry runs and status.

pub mod backup;
pub mod cache;
pub mod content;
pub mod cycle;
pub mod diff;
pub mod error;
pub mod executor;
pub mod lister;
pub mod notify;
pub mod reconcile;
pub mod retention;
pub mod writer;

pub use cache::{CacheMirror, CacheVerdict};
pub use cycle::{bootstrap, plan_cycle, run_cycle, CycleReport, CycleState, SyncEnv};
pub use error::SyncError;
pub use executor::{TransferExecutor, TransferOutcome};
pub use lister::{LocalLister, RemoteLister, SnapshotSource};
pub use notify::{DesktopNotifier, LogNotifier, Notifier};
pub use reconcile::{reconcile, reconcile_cached, Decision, Plan, Policy, Reason};

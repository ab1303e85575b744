//! todosync core library: domain types, clock normalization, configuration,
//! and the remote store contract.
//!
//! - [`types`]: newtypes, records, snapshots, actions
//! - [`clock`]: [`ClockNormalizer`]
//! - [`config`]: load / save / credential
//! - [`remote`]: [`RemoteStore`] and [`MemoryStore`]
//! - [`error`]: [`ConfigError`], [`ClockError`], [`RemoteError`]

pub mod clock;
pub mod config;
pub mod error;
pub mod remote;
pub mod types;

pub use clock::ClockNormalizer;
pub use config::{CompareMode, Config, ConfigFile, Credential};
pub use error::{ClockError, ConfigError, RemoteError};
pub use remote::{remote_path, EntryTag, MemoryStore, RemoteEntry, RemoteStore};
pub use types::{is_todo_name, Action, FileName, FileRecord, Side, Snapshot, Stamp, TODO_SUFFIX};

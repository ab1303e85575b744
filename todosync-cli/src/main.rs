//! todosync: keep a directory of `.todo` files in step with Dropbox.
//!
//! # Usage
//!
//! ```text
//! todosync init [--todo-dir D] [--token-file F] [--interval S] [--remote-folder P] [--comparison M]
//! todosync run
//! todosync sync [--dry-run] [--local]
//! todosync status [--json]
//! todosync diff <name>
//! todosync backups list|prune [--days N]
//! todosync daemon status|stop|logs [--lines N]
//! ```

mod commands;

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    backups::BackupsCommand, daemon::DaemonCommand, diff::DiffArgs, init::InitArgs,
    status::StatusArgs, sync::SyncArgs,
};
use todosync_core::CompareMode;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "todosync",
    version,
    about = "Keep a directory of .todo files in sync with a Dropbox folder",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write or update ~/.todosync/config.yaml.
    Init(InitArgs),

    /// Run the agent in the foreground: bootstrap, then poll until stopped.
    Run,

    /// Run one sync cycle now (through the agent when it is running).
    Sync(SyncArgs),

    /// Show what the next cycle would do, file by file.
    Status(StatusArgs),

    /// Show a unified diff between the remote and local copy of one file.
    Diff(DiffArgs),

    /// Inspect or prune dated backup folders.
    Backups {
        #[command(subcommand)]
        command: BackupsCommand,
    },

    /// Talk to a running agent.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Shared CompareMode argument: parsed from CLI strings, converts to core type
// ---------------------------------------------------------------------------

/// Thin wrapper so clap can parse `CompareMode` from CLI args.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompareModeArg(pub CompareMode);

impl FromStr for CompareModeArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "metadata" => Ok(Self(CompareMode::Metadata)),
            "content" => Ok(Self(CompareMode::Content)),
            "cache" => Ok(Self(CompareMode::Cache)),
            other => Err(format!(
                "unknown comparison mode '{other}'; expected: metadata, content, cache"
            )),
        }
    }
}

impl fmt::Display for CompareModeArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<CompareModeArg> for CompareMode {
    fn from(m: CompareModeArg) -> Self {
        m.0
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Run => commands::daemon::run_foreground(),
        Commands::Sync(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Backups { command } => commands::backups::run(command),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}

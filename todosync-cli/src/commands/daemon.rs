//! `todosync run` and `todosync daemon`: the agent and its control socket.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use todosync_daemon::log_rotation::tail;
use todosync_daemon::paths::{log_path, socket_path};
use todosync_daemon::{request_status, request_stop, start_blocking, DaemonError};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Query the running agent over its Unix socket.
    Status,
    /// Ask the running agent to finish its current cycle and exit.
    Stop,
    /// Print recent agent log lines.
    Logs(DaemonLogsArgs),
}

#[derive(Args, Debug)]
pub struct DaemonLogsArgs {
    /// Number of trailing lines to show.
    #[arg(long, default_value_t = 100)]
    pub lines: usize,
}

pub fn run_foreground() -> Result<()> {
    let home = super::home()?;
    start_blocking(&home).context("agent exited with error")
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = super::home()?;

    match command {
        DaemonCommand::Status => {
            let status = match request_status(&home) {
                Ok(status) => status,
                Err(DaemonError::DaemonNotRunning { .. }) => serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                }),
                Err(err) => return Err(err).context("failed to query agent status"),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&status).context("failed to render agent status JSON")?
            );
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("agent stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => println!("agent is not running"),
            Err(err) => return Err(err).context("failed to stop agent"),
        },
        DaemonCommand::Logs(args) => {
            let path = log_path(&home);
            if !path.exists() {
                println!("log file not found: {}", path.display());
                return Ok(());
            }
            let lines = tail(&path, args.lines).with_context(|| format!("read {}", path.display()))?;
            println!("==> {} <==", path.display());
            for line in lines {
                println!("{line}");
            }
        }
    }

    Ok(())
}

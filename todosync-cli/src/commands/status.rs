//! `todosync status`: agent state and the per-file plan for the next cycle.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use serde_json::{json, Value};

use todosync_daemon::{request_status, DaemonError};
use todosync_sync::{plan_cycle, CycleState, LogNotifier, Plan, SyncEnv};

use super::report::print_plan;

/// Arguments for `todosync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StatusJson<'a> {
    agent: Value,
    todo_dir: String,
    remote_folder: &'a str,
    comparison: String,
    local_files: usize,
    plan: &'a Plan,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let config = super::load_config(&home)?;
        let store = super::open_store(&config)?;
        let env = SyncEnv::new(&config, &store, &LogNotifier);

        let current = env.local_snapshot().context("cannot list the todo directory")?;
        let local_files = current.len();
        let plan = plan_cycle(&env, &CycleState::new(current)).context("planning failed")?;

        let agent = match request_status(&home) {
            Ok(status) => status,
            Err(DaemonError::DaemonNotRunning { .. }) => json!({ "running": false }),
            Err(err) => return Err(err).context("failed to query agent status"),
        };

        if self.json {
            let payload = StatusJson {
                agent,
                todo_dir: config.todo_dir.display().to_string(),
                remote_folder: &config.remote_folder,
                comparison: config.comparison.to_string(),
                local_files,
                plan: &plan,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        println!(
            "todosync v{} | {} local files | {} ↔ {} | {} comparison",
            env!("CARGO_PKG_VERSION"),
            local_files,
            config.todo_dir.display(),
            config.remote_folder,
            config.comparison,
        );
        print_agent_line(&agent);
        print_plan(&plan, "");
        Ok(())
    }
}

fn print_agent_line(agent: &Value) {
    if agent["running"] != Value::Bool(true) {
        println!("agent: {}", "stopped".bright_black());
        return;
    }
    let mut line = format!(
        "agent: {} (pid {}) | {} cycles",
        "running".green().bold(),
        agent["pid"],
        agent["cycles"].as_u64().unwrap_or(0)
    );
    let skipped = agent["skipped_cycles"].as_u64().unwrap_or(0);
    if skipped > 0 {
        line.push_str(&format!(", {skipped} skipped"));
    }
    println!("{line}");
    if let Some(error) = agent["last_error"].as_str() {
        println!("  last error: {}", error.red());
    }
}

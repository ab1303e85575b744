//! `todosync sync`: run one cycle now.

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Args;

use todosync_daemon::{request_sync, DaemonError};
use todosync_sync::{bootstrap, notify, plan_cycle, run_cycle, CycleState, SyncEnv};

use super::report::{failure_count, print_cycle_report, print_plan};

/// Arguments for `todosync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Show what the cycle would do without backing up or transferring anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Run the cycle in this process even when an agent is running.
    #[arg(long)]
    pub local: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;

        if !self.dry_run && !self.local {
            match request_sync(&home) {
                Ok(report) => return finish(&report),
                Err(DaemonError::DaemonNotRunning { .. }) => {}
                Err(err) => return Err(err).context("agent failed to run the cycle"),
            }
        }

        let config = super::load_config(&home)?;
        let store = super::open_store(&config)?;
        let notifier = notify::from_config(&config);
        let env = SyncEnv::new(&config, &store, notifier.as_ref());

        if self.dry_run {
            let current = env.local_snapshot().context("cannot list the todo directory")?;
            let plan = plan_cycle(&env, &CycleState::new(current)).context("planning failed")?;
            print_plan(&plan, "[dry-run] ");
            return Ok(());
        }

        let today = Local::now().date_naive();
        let (mut state, _) = bootstrap(&env, today).context("bootstrap failed")?;
        let report = run_cycle(&env, &mut state, today).context("sync cycle failed")?;
        let report = serde_json::to_value(&report).context("failed to serialize cycle report")?;
        finish(&report)
    }
}

fn finish(report: &serde_json::Value) -> Result<()> {
    print_cycle_report(report);
    let failures = failure_count(report);
    if failures > 0 {
        bail!("{failures} operation(s) failed; they will be retried on the next cycle");
    }
    Ok(())
}

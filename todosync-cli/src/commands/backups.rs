//! `todosync backups`: list and prune dated backup folders.

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use todosync_sync::{backup, retention};

#[derive(Subcommand, Debug)]
pub enum BackupsCommand {
    /// List backup folders, oldest first.
    List,
    /// Delete backup folders that are at least N days old.
    Prune(PruneArgs),
}

#[derive(Args, Debug)]
pub struct PruneArgs {
    /// Retention window in days; defaults to `retention_days` from the config.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub days: Option<u32>,
}

#[derive(Tabled)]
struct BackupRow {
    #[tabled(rename = "folder")]
    folder: String,
    #[tabled(rename = "date")]
    date: String,
    #[tabled(rename = "files")]
    files: usize,
    #[tabled(rename = "age")]
    age: String,
}

pub fn run(command: BackupsCommand) -> Result<()> {
    let home = super::home()?;
    let config = super::load_config(&home)?;
    let root = &config.backup_dir;
    let today = Local::now().date_naive();

    match command {
        BackupsCommand::List => {
            let folders = backup::list_backups(root)
                .with_context(|| format!("cannot list backups under {}", root.display()))?;
            if folders.is_empty() {
                println!("No backups under {}.", root.display());
                return Ok(());
            }
            let mut rows = Vec::with_capacity(folders.len());
            for folder in &folders {
                let files = folder
                    .files()
                    .with_context(|| format!("cannot read {}", folder.path.display()))?;
                let days = (today - folder.date).num_days();
                rows.push(BackupRow {
                    folder: backup::folder_name(folder.date),
                    date: folder.date.format("%Y-%m-%d").to_string(),
                    files: files.len(),
                    age: match days {
                        0 => "today".to_string(),
                        1 => "1 day".to_string(),
                        n => format!("{n} days"),
                    },
                });
            }
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
            println!(
                "{} folder(s) under {}; kept for {} days",
                folders.len(),
                root.display(),
                config.retention_days
            );
        }
        BackupsCommand::Prune(args) => {
            let days = args.days.unwrap_or(config.retention_days);
            let removed = retention::prune(root, today, days)
                .with_context(|| format!("failed to prune backups under {}", root.display()))?;
            if removed.is_empty() {
                println!("Nothing older than {days} days.");
            }
            for folder in &removed {
                println!("  -  removed {}", folder.path.display());
            }
        }
    }
    Ok(())
}

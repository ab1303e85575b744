//! `todosync init`: create or update the configuration file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use todosync_core::{config, Config};

use super::super::CompareModeArg;

/// Write `~/.todosync/config.yaml`, keeping keys that are not given.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory holding the `.todo` files.
    #[arg(long, value_name = "DIR")]
    pub todo_dir: Option<PathBuf>,

    /// File containing the Dropbox access token.
    #[arg(long, value_name = "FILE")]
    pub token_file: Option<PathBuf>,

    /// Seconds between sync cycles.
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Dropbox folder to mirror, e.g. `/todos`.
    #[arg(long, value_name = "PATH")]
    pub remote_folder: Option<String>,

    /// metadata | content | cache.
    #[arg(long, value_name = "MODE")]
    pub comparison: Option<CompareModeArg>,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let mut file = config::load_file_at(&home).with_context(|| {
            format!(
                "cannot read existing {}",
                config::config_path_at(&home).display()
            )
        })?;

        if let Some(dir) = self.todo_dir {
            file.todo_dir = Some(absolute(&dir)?.display().to_string());
        }
        if let Some(token) = self.token_file {
            file.token_file = Some(absolute(&token)?.display().to_string());
        }
        if let Some(secs) = self.interval {
            file.poll_interval_secs = Some(secs);
        }
        if let Some(folder) = self.remote_folder {
            file.remote_folder = Some(folder);
        }
        if let Some(mode) = self.comparison {
            file.comparison = Some(mode.into());
        }

        let resolved =
            Config::resolve(&home, file.clone()).context("refusing to write an invalid configuration")?;
        let path = config::save_file_at(&home, &file)
            .with_context(|| format!("failed to write {}", config::config_path_at(&home).display()))?;

        println!("✓ Wrote {}", path.display());
        println!("  todo dir:      {}", resolved.todo_dir.display());
        println!("  backups:       {}", resolved.backup_dir.display());
        println!("  remote folder: {}", resolved.remote_folder);
        println!("  every {}s, {} comparison", resolved.poll_interval.as_secs(), resolved.comparison);
        if config::read_credential(&resolved.token_file).is_err() {
            println!(
                "  Next: put your Dropbox access token in {}",
                resolved.token_file.display()
            );
        }
        Ok(())
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("cannot resolve the current directory")?;
    Ok(cwd.join(path))
}

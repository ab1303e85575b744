//! `todosync diff <name>`: remote vs local content of one file.

use anyhow::{bail, Context, Result};
use clap::Args;

use todosync_core::{is_todo_name, FileName};
use todosync_sync::diff::diff_file;

/// Arguments for `todosync diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// File name inside the todo directory, e.g. `work.todo`.
    pub name: String,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        if !is_todo_name(&self.name) || self.name.contains('/') {
            bail!("'{}' is not a .todo file name", self.name);
        }
        let home = super::home()?;
        let config = super::load_config(&home)?;
        let store = super::open_store(&config)?;

        let name = FileName::from(self.name.as_str());
        let diff = diff_file(&config.todo_dir, &store, &config.remote_folder, &name)
            .with_context(|| format!("diff failed for '{name}'"))?;

        if !diff.local_exists && !diff.remote_exists {
            bail!("'{name}' exists neither locally nor in {}", config.remote_folder);
        }
        if diff.is_identical() {
            println!("No differences for '{name}'.");
            return Ok(());
        }

        print!("{}", diff.unified_diff);
        if !diff.unified_diff.ends_with('\n') {
            println!();
        }
        Ok(())
    }
}

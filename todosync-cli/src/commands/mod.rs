pub mod backups;
pub mod daemon;
pub mod diff;
pub mod init;
pub mod report;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use todosync_core::{config, Config};
use todosync_dropbox::DropboxClient;

pub fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

pub fn load_config(home: &Path) -> Result<Config> {
    config::load_at(home).with_context(|| {
        format!(
            "failed to load {}",
            config::config_path_at(home).display()
        )
    })
}

/// Dropbox client for `config`; fails when no token has been stored yet.
pub fn open_store(config: &Config) -> Result<DropboxClient> {
    let token = config::read_credential(&config.token_file).with_context(|| {
        format!(
            "no Dropbox token; write an access token to {}",
            config.token_file.display()
        )
    })?;
    Ok(DropboxClient::from_config(config, token))
}

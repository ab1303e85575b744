use std::path::{Path, PathBuf};

use todosync_core::config::state_dir_at;

pub const AGENT_LOG: &str = "agent.log";
pub const AGENT_SOCKET: &str = "agent.sock";

/// `~/.todosync`, shared with the config file and credential.
pub fn state_root(home: &Path) -> PathBuf {
    state_dir_at(home)
}

pub fn socket_path(home: &Path) -> PathBuf {
    state_root(home).join(AGENT_SOCKET)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    state_root(home).join("logs")
}

pub fn log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(AGENT_LOG)
}

//! Agent configuration and credential loading.
//!
//! # Storage layout
//!
//! ```text
//! ~/.todosync/
//!   config.yaml   (optional: every key has a default, mode 0600)
//!   token         (bearer credential, default location)
//! ```
//!
//! # API pattern
//!
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};

pub const DEFAULT_API_URL: &str = "https://api.dropboxapi.com/2";
pub const DEFAULT_CONTENT_URL: &str = "https://content.dropboxapi.com/2";

// ---------------------------------------------------------------------------
// Comparison mode
// ---------------------------------------------------------------------------

/// How the reconciliation engine decides that two observations differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompareMode {
    /// Tolerance band, then size, then content digest when one is known.
    Metadata,
    /// Content digest equality; metadata heuristic only when a digest is missing.
    #[default]
    Content,
    /// Fresh byte copies of both sides, compared exactly every cycle.
    Cache,
}

impl fmt::Display for CompareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareMode::Metadata => write!(f, "metadata"),
            CompareMode::Content => write!(f, "content"),
            CompareMode::Cache => write!(f, "cache"),
        }
    }
}

// ---------------------------------------------------------------------------
// On-disk shape
// ---------------------------------------------------------------------------

/// `config.yaml` as written by users. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todo_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<CompareMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_tolerance_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_tolerance_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_utc_offset_minutes: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_backoff_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desktop_notifications: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved configuration with absolute paths and defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub todo_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub token_file: PathBuf,
    pub remote_folder: String,
    pub poll_interval: Duration,
    pub comparison: CompareMode,
    pub local_tolerance: chrono::Duration,
    pub remote_tolerance: chrono::Duration,
    pub retention_days: u32,
    pub remote_utc_offset_minutes: Option<i32>,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub desktop_notifications: bool,
    pub api_url: String,
    pub content_url: String,
}

impl Config {
    /// Apply defaults to `file`, resolving paths against `home`.
    pub fn resolve(home: &Path, file: ConfigFile) -> Result<Self, ConfigError> {
        let todo_dir = file
            .todo_dir
            .as_deref()
            .map(|raw| expand_path(home, raw))
            .unwrap_or_else(|| home.join("Documents"));
        let backup_dir = file
            .backup_dir
            .as_deref()
            .map(|raw| expand_path(home, raw))
            .unwrap_or_else(|| todo_dir.join("ToDosBak"));
        let token_file = file
            .token_file
            .as_deref()
            .map(|raw| expand_path(home, raw))
            .unwrap_or_else(|| state_dir_at(home).join("token"));

        let config = Self {
            todo_dir,
            backup_dir,
            token_file,
            remote_folder: normalize_remote_folder(file.remote_folder.as_deref().unwrap_or("/todos")),
            poll_interval: Duration::from_secs(file.poll_interval_secs.unwrap_or(10)),
            comparison: file.comparison.unwrap_or_default(),
            local_tolerance: chrono::Duration::minutes(i64::from(
                file.local_tolerance_minutes.unwrap_or(2),
            )),
            remote_tolerance: chrono::Duration::minutes(i64::from(
                file.remote_tolerance_minutes.unwrap_or(4),
            )),
            retention_days: file.retention_days.unwrap_or(7),
            remote_utc_offset_minutes: file.remote_utc_offset_minutes,
            request_timeout: Duration::from_secs(file.request_timeout_secs.unwrap_or(30)),
            max_retries: file.max_retries.unwrap_or(2),
            retry_backoff: Duration::from_millis(file.retry_backoff_ms.unwrap_or(500)),
            desktop_notifications: file.desktop_notifications.unwrap_or(false),
            api_url: file
                .api_url
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            content_url: file
                .content_url
                .unwrap_or_else(|| DEFAULT_CONTENT_URL.to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Defaults for `home`.
    pub fn defaults_at(home: &Path) -> Result<Self, ConfigError> {
        Self::resolve(home, ConfigFile::default())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "poll_interval_secs",
                reason: "must be at least 1 second".to_string(),
            });
        }
        if self.retention_days == 0 {
            return Err(ConfigError::Invalid {
                key: "retention_days",
                reason: "must keep at least one day of backups".to_string(),
            });
        }
        if !self.remote_folder.starts_with('/') {
            return Err(ConfigError::Invalid {
                key: "remote_folder",
                reason: format!("'{}' must be absolute", self.remote_folder),
            });
        }
        if self.backup_dir == self.todo_dir {
            return Err(ConfigError::Invalid {
                key: "backup_dir",
                reason: "must differ from todo_dir".to_string(),
            });
        }
        Ok(())
    }

    /// `<backup_dir>/.cache`
    pub fn cache_dir(&self) -> PathBuf {
        self.backup_dir.join(".cache")
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.todosync/`
pub fn state_dir_at(home: &Path) -> PathBuf {
    home.join(".todosync")
}

/// `<home>/.todosync/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    state_dir_at(home).join("config.yaml")
}

fn expand_path(home: &Path, raw: &str) -> PathBuf {
    let home_str = home.to_string_lossy().into_owned();
    let expanded = shellexpand::tilde_with_context(raw, || Some(home_str));
    let path = PathBuf::from(expanded.as_ref());
    if path.is_absolute() {
        path
    } else {
        home.join(path)
    }
}

fn normalize_remote_folder(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load the on-disk file for `home`; a missing file is an empty file.
pub fn load_file_at(home: &Path) -> Result<ConfigFile, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(ConfigFile::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(ConfigFile::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
}

/// Load and resolve the configuration for `home`.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    Config::resolve(home, load_file_at(home)?)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&home()?)
}

/// Atomically save `file` to `<home>/.todosync/config.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_file_at(home: &Path, file: &ConfigFile) -> Result<PathBuf, ConfigError> {
    let dir = state_dir_at(home);
    std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    let path = config_path_at(home);
    let tmp = path.with_extension("yaml.tmp");

    let yaml = serde_yaml::to_string(file)?;
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(path)
}

/// Resolve the user's home directory.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// Opaque bearer credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Read the bearer credential from `path`, trimming surrounding whitespace.
pub fn read_credential(path: &Path) -> Result<Credential, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::MissingCredential {
                path: path.to_path_buf(),
            })
        }
        Err(err) => return Err(io_err(path, err)),
    };
    let token = raw.trim();
    if token.is_empty() {
        return Err(ConfigError::MissingCredential {
            path: path.to_path_buf(),
        });
    }
    Ok(Credential::new(token))
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

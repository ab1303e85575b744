//! Error types for todosync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from configuration and credential loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, with the offending path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the file path.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// A value that parses but cannot be used.
    #[error("invalid config value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },

    /// The bearer credential file is missing or empty.
    #[error("credential file {path} is missing or empty")]
    MissingCredential { path: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}

/// Timestamp parsing failures.
#[derive(Debug, Error)]
pub enum ClockError {
    #[error("unrecognised timestamp '{raw}': {source}")]
    Unrecognised {
        raw: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Failures reported by a remote object store.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The store answered with a non-success status.
    #[error("remote returned status {code}: {message}")]
    Status { code: u16, message: String },

    /// Connection, TLS, or timeout failure before a status was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// The store answered successfully but the payload could not be decoded.
    #[error("cannot decode remote response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Whether a later attempt at the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Status { code, .. } => *code == 429 || *code >= 500,
            RemoteError::Transport(_) => true,
            RemoteError::Decode(_) => false,
        }
    }
}

//! Config error-message, atomic-write-safety, and credential integration tests.
//! Storage: ~/.todosync/config.yaml

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use std::fs;
use todosync_core::{
    config::{self, CompareMode, ConfigFile},
    ConfigError,
};

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn missing_config_yields_defaults() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let config = config::load_at(home.path()).expect("load");
    assert_eq!(config.todo_dir, home.path().join("Documents"));
}

#[test]
fn empty_config_yields_defaults() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".todosync/config.yaml").write_str("\n").expect("write");
    let config = config::load_at(home.path()).expect("load");
    assert_eq!(config.retention_days, 7);
}

#[test]
fn corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".todosync/config.yaml")
        .write_str("todo_dir: [unclosed\n")
        .expect("write");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn unknown_key_is_rejected() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".todosync/config.yaml")
        .write_str("poll_interval: 5\n")
        .expect("write");
    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
}

#[test]
fn comparison_mode_parses_lowercase() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".todosync/config.yaml")
        .write_str("comparison: metadata\nlocal_tolerance_minutes: 3\nremote_tolerance_minutes: 240\n")
        .expect("write");
    let config = config::load_at(home.path()).expect("load");
    assert_eq!(config.comparison, CompareMode::Metadata);
    assert_eq!(config.local_tolerance, chrono::Duration::minutes(3));
    assert_eq!(config.remote_tolerance, chrono::Duration::minutes(240));
}

// ---------------------------------------------------------------------------
// 2. Atomic write safety
// ---------------------------------------------------------------------------

#[test]
fn save_creates_file_with_private_mode() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = ConfigFile {
        todo_dir: Some("~/Documents/todos".to_string()),
        ..ConfigFile::default()
    };
    let path = config::save_file_at(home.path(), &file).expect("save");

    home.child(".todosync/config.yaml").assert(predicate::path::exists());
    home.child(".todosync/config.yaml.tmp").assert(predicate::path::missing());
    home.child(".todosync/config.yaml")
        .assert(predicate::str::contains("todo_dir"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&path).expect("meta").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "expected 0600, got {mode:o}");
    }
}

#[test]
fn leftover_tmp_does_not_affect_load() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = ConfigFile {
        poll_interval_secs: Some(5),
        ..ConfigFile::default()
    };
    config::save_file_at(home.path(), &file).expect("save");
    home.child(".todosync/config.yaml.tmp")
        .write_str("CRASH - INCOMPLETE WRITE")
        .expect("write crash tmp");

    let config = config::load_at(home.path()).expect("load");
    assert_eq!(config.poll_interval, std::time::Duration::from_secs(5));
}

#[test]
fn saved_file_omits_unset_keys() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    config::save_file_at(home.path(), &ConfigFile::default()).expect("save");
    let contents = fs::read_to_string(config::config_path_at(home.path())).expect("read");
    assert!(!contents.contains("retention_days"), "got: {contents}");
}

// ---------------------------------------------------------------------------
// 3. Credential
// ---------------------------------------------------------------------------

#[test]
fn credential_error_names_the_file() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let config = config::load_at(home.path()).expect("load");
    let err = config::read_credential(&config.token_file).unwrap_err();
    assert!(err.to_string().contains("token"), "got: {err}");
}

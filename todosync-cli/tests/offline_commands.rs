//! Commands that work without a Dropbox connection.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use assert_cmd::prelude::*;
use chrono::Local;
use predicates::str::contains;
use tempfile::TempDir;

use todosync_core::{config, CompareMode};
use todosync_sync::backup::folder_name;

fn todosync_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("todosync"));
    cmd.env("HOME", home).env_remove("RUST_LOG");
    cmd
}

fn backup_root(home: &Path) -> std::path::PathBuf {
    home.join("Documents").join("ToDosBak")
}

fn make_backup(home: &Path, folder: &str, files: &[&str]) {
    let dir = backup_root(home).join(folder);
    fs::create_dir_all(&dir).expect("create backup folder");
    for name in files {
        fs::write(dir.join(name), "- [ ] item\n").expect("write backup file");
    }
}

// ─── init ─────────────────────────────────────────────────────────────────────

#[test]
fn init_writes_requested_settings() {
    let home = TempDir::new().expect("home");
    let todo_dir = home.path().join("notes");

    todosync_cmd(home.path())
        .args(["init", "--todo-dir"])
        .arg(&todo_dir)
        .args(["--interval", "30", "--comparison", "metadata"])
        .assert()
        .success()
        .stdout(contains("config.yaml"))
        .stdout(contains("Next: put your Dropbox access token"));

    let config = config::load_at(home.path()).expect("load written config");
    assert_eq!(config.todo_dir, todo_dir);
    assert_eq!(config.backup_dir, todo_dir.join("ToDosBak"));
    assert_eq!(config.poll_interval, Duration::from_secs(30));
    assert_eq!(config.comparison, CompareMode::Metadata);
}

#[test]
fn init_keeps_keys_it_was_not_given() {
    let home = TempDir::new().expect("home");

    todosync_cmd(home.path())
        .args(["init", "--interval", "45"])
        .assert()
        .success();
    todosync_cmd(home.path())
        .args(["init", "--remote-folder", "/notes"])
        .assert()
        .success();

    let config = config::load_at(home.path()).expect("load config");
    assert_eq!(config.poll_interval, Duration::from_secs(45));
    assert_eq!(config.remote_folder, "/notes");
}

#[test]
fn init_rejects_zero_interval_and_writes_nothing() {
    let home = TempDir::new().expect("home");

    todosync_cmd(home.path())
        .args(["init", "--interval", "0"])
        .assert()
        .failure()
        .stderr(contains("poll_interval_secs"));

    assert!(!config::config_path_at(home.path()).exists());
}

#[test]
fn init_rejects_unknown_comparison_mode() {
    let home = TempDir::new().expect("home");

    todosync_cmd(home.path())
        .args(["init", "--comparison", "guess"])
        .assert()
        .failure()
        .stderr(contains("expected: metadata, content, cache"));
}

// ─── backups ──────────────────────────────────────────────────────────────────

#[test]
fn backups_list_without_backups() {
    let home = TempDir::new().expect("home");

    todosync_cmd(home.path())
        .args(["backups", "list"])
        .assert()
        .success()
        .stdout(contains("No backups under"));
}

#[test]
fn backups_list_shows_dated_folders_only() {
    let home = TempDir::new().expect("home");
    make_backup(home.path(), "todos_bak-01_06_2024", &["work.todo", "home.todo"]);
    make_backup(home.path(), ".cache", &["work.todo"]);
    make_backup(home.path(), "scratch", &[]);

    let assert = todosync_cmd(home.path())
        .args(["backups", "list"])
        .assert()
        .success()
        .stdout(contains("todos_bak-01_06_2024"))
        .stdout(contains("2024-06-01"));
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    assert!(!stdout.contains(".cache"));
    assert!(!stdout.contains("scratch"));
    assert!(stdout.contains("1 folder(s)"));
}

#[test]
fn backups_prune_removes_only_expired_folders() {
    let home = TempDir::new().expect("home");
    let today = folder_name(Local::now().date_naive());
    make_backup(home.path(), "todos_bak-01_01_2000", &["work.todo"]);
    make_backup(home.path(), &today, &["work.todo"]);

    todosync_cmd(home.path())
        .args(["backups", "prune", "--days", "7"])
        .assert()
        .success()
        .stdout(contains("todos_bak-01_01_2000"));

    assert!(!backup_root(home.path()).join("todos_bak-01_01_2000").exists());
    assert!(backup_root(home.path()).join(&today).exists());
}

#[test]
fn backups_prune_rejects_zero_days() {
    let home = TempDir::new().expect("home");

    todosync_cmd(home.path())
        .args(["backups", "prune", "--days", "0"])
        .assert()
        .failure();
}

// ─── commands that need the remote ────────────────────────────────────────────

#[test]
fn status_without_token_names_the_token_file() {
    let home = TempDir::new().expect("home");

    todosync_cmd(home.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(contains("no Dropbox token"))
        .stderr(contains(".todosync/token"));
}

#[test]
fn dry_run_without_token_fails_before_touching_files() {
    let home = TempDir::new().expect("home");

    todosync_cmd(home.path())
        .args(["sync", "--dry-run"])
        .assert()
        .failure()
        .stderr(contains("no Dropbox token"));

    assert!(!backup_root(home.path()).exists());
}

#[test]
fn diff_rejects_names_that_are_not_todo_files() {
    let home = TempDir::new().expect("home");

    todosync_cmd(home.path())
        .args(["diff", "notes.txt"])
        .assert()
        .failure()
        .stderr(contains("not a .todo file name"));
}

// ─── daemon ───────────────────────────────────────────────────────────────────

#[test]
fn daemon_status_reports_not_running() {
    let home = TempDir::new().expect("home");

    todosync_cmd(home.path())
        .args(["daemon", "status"])
        .assert()
        .success()
        .stdout(contains("\"running\": false"))
        .stdout(contains("agent.sock"));
}

#[test]
fn daemon_stop_when_not_running() {
    let home = TempDir::new().expect("home");

    todosync_cmd(home.path())
        .args(["daemon", "stop"])
        .assert()
        .success()
        .stdout(contains("agent is not running"));
}

#[test]
fn daemon_logs_tails_the_agent_log() {
    let home = TempDir::new().expect("home");

    todosync_cmd(home.path())
        .args(["daemon", "logs"])
        .assert()
        .success()
        .stdout(contains("log file not found"));

    let logs = home.path().join(".todosync").join("logs");
    fs::create_dir_all(&logs).expect("logs dir");
    let lines: String = (1..=5).map(|n| format!("line {n}\n")).collect();
    fs::write(logs.join("agent.log"), lines).expect("write log");

    let assert = todosync_cmd(home.path())
        .args(["daemon", "logs", "--lines", "2"])
        .assert()
        .success()
        .stdout(contains("line 4"))
        .stdout(contains("line 5"));
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    assert!(!stdout.contains("line 3"));
}

#[test]
fn run_without_token_exits_with_diagnostic() {
    let home = TempDir::new().expect("home");

    todosync_cmd(home.path())
        .arg("run")
        .assert()
        .failure()
        .stderr(contains("credential file"));
}

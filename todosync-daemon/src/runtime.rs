use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Local;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::MissedTickBehavior;

use todosync_core::{config, Config, RemoteStore};
use todosync_dropbox::DropboxClient;
use todosync_sync::{bootstrap, notify, run_cycle, CycleReport, CycleState, Notifier, SyncEnv, SyncError};

use crate::error::{io_err, DaemonError};
use crate::log_rotation::AppendLog;
use crate::paths::{log_path, logs_dir, socket_path, state_root};
use crate::protocol::{DaemonRequest, DaemonResponse, CMD_STATUS, CMD_STOP, CMD_SYNC};

const LOG_ROTATION_INTERVAL: Duration = Duration::from_secs(60);

/// The collaborators a running agent works with.
#[derive(Clone)]
pub struct Agent {
    config: Arc<Config>,
    store: Arc<dyn RemoteStore>,
    notifier: Arc<dyn Notifier>,
}

impl Agent {
    pub fn new(config: Config, store: Arc<dyn RemoteStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            notifier,
        }
    }

    /// Dropbox store and the configured notification sink.
    ///
    /// Fails when the credential file is missing or empty.
    pub fn from_config(config: Config) -> Result<Self, DaemonError> {
        let token = config::read_credential(&config.token_file)?;
        let store = Arc::new(DropboxClient::from_config(&config, token));
        let notifier: Arc<dyn Notifier> = Arc::from(notify::from_config(&config));
        Ok(Self::new(config, store, notifier))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn env(&self) -> SyncEnv<'_> {
        SyncEnv::new(&self.config, self.store.as_ref(), self.notifier.as_ref())
    }
}

struct CycleJob {
    source: &'static str,
    respond_to: oneshot::Sender<Result<Value, String>>,
}

/// Counters and the last outcome, served by `status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentStatus {
    pub started_at_unix: u64,
    pub cycles: u64,
    pub skipped_cycles: u64,
    pub failed_cycles: u64,
    pub last_cycle_at_unix: u64,
    pub last_report: Option<Value>,
    pub last_error: Option<String>,
}

impl AgentStatus {
    fn new(started_at_unix: u64) -> Self {
        Self {
            started_at_unix,
            ..Self::default()
        }
    }

    /// Fold one cycle outcome in; returns what a `sync` caller receives.
    fn record(&mut self, source: &str, result: Result<CycleReport, SyncError>) -> Result<Value, String> {
        self.last_cycle_at_unix = unix_seconds_now();
        match result {
            Ok(report) => {
                match &report.skipped {
                    Some(reason) => {
                        self.skipped_cycles += 1;
                        tracing::warn!(source, reason = %reason, "cycle skipped");
                    }
                    None => {
                        self.cycles += 1;
                        if report.is_noop() {
                            tracing::debug!(source, "nothing to do");
                        } else {
                            tracing::info!(
                                source,
                                duration_ms = report.duration_ms,
                                summary = %report.summary(),
                                "cycle complete"
                            );
                        }
                    }
                }
                let value = serde_json::to_value(&report).map_err(|e| e.to_string())?;
                self.last_report = Some(value.clone());
                self.last_error = None;
                Ok(value)
            }
            Err(err) => {
                self.failed_cycles += 1;
                tracing::error!(source, error = %err, "cycle failed, retrying next interval");
                self.last_error = Some(err.to_string());
                Err(err.to_string())
            }
        }
    }
}

/// Load configuration, start the agent, and block until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing(home);
    let config = config::load_at(home)?;
    let agent = Agent::from_config(config)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), agent))
}

/// Bootstrap, then run the poll loop until `stop` or Ctrl-C.
pub async fn run(home: PathBuf, agent: Agent) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;
    prepare_socket_for_bind(&socket_path(&home))?;

    let state = {
        let bootstrap_agent = agent.clone();
        let (state, report) = tokio::task::spawn_blocking(move || {
            bootstrap(&bootstrap_agent.env(), Local::now().date_naive())
        })
        .await
        .map_err(|err| DaemonError::Protocol(format!("bootstrap join error: {err}")))??;
        tracing::info!(
            local_files = report.local_files,
            backup_taken = report.backup.is_some(),
            pruned = report.pruned.len(),
            todo_dir = %agent.config.todo_dir.display(),
            "bootstrap complete"
        );
        state
    };

    let status = Arc::new(RwLock::new(AgentStatus::new(unix_seconds_now())));
    let (cycle_tx, cycle_rx) = mpsc::channel::<CycleJob>(16);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let poll_handle = {
        let shutdown = shutdown_tx.clone();
        let agent = agent.clone();
        let status = status.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = poll_loop_task(agent, state, status, cycle_rx, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let config = agent.config.clone();
        let status = status.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                home,
                config,
                status,
                cycle_tx,
                shutdown.clone(),
                shutdown.subscribe(),
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        tokio::spawn(async move {
            let result = log_rotation_task(home, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, finishing current cycle");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (poll_result, socket_result, rotation_result, signal_result) =
        tokio::join!(poll_handle, socket_handle, rotation_handle, signal_handle);

    if let Err(err) = agent.env().cache().clear() {
        tracing::warn!(error = %err, "could not clear cache mirror on exit");
    }
    tracing::info!("agent stopped");

    handle_join("poll_loop", poll_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

/// Owns [`CycleState`]; runs a cycle on every tick and on every queued job.
///
/// Shutdown is only observed between cycles.
async fn poll_loop_task(
    agent: Agent,
    mut state: CycleState,
    status: Arc<RwLock<AgentStatus>>,
    mut cycle_rx: mpsc::Receiver<CycleJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(agent.config.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            maybe_job = cycle_rx.recv() => {
                let Some(job) = maybe_job else { break };
                Some(job)
            }
            _ = interval.tick() => None,
        };
        let source = job.as_ref().map_or("timer", |job| job.source);

        let (next, result) = run_cycle_blocking(agent.clone(), state).await?;
        state = next;
        let outcome = status.write().await.record(source, result);

        if let Some(job) = job {
            let _ = job.respond_to.send(outcome);
        }
    }

    Ok(())
}

async fn run_cycle_blocking(
    agent: Agent,
    mut state: CycleState,
) -> Result<(CycleState, Result<CycleReport, SyncError>), DaemonError> {
    tokio::task::spawn_blocking(move || {
        let env = agent.env();
        let result = run_cycle(&env, &mut state, Local::now().date_naive());
        (state, result)
    })
    .await
    .map_err(|err| DaemonError::Protocol(format!("cycle task join error: {err}")))
}

async fn socket_server_task(
    home: PathBuf,
    config: Arc<Config>,
    status: Arc<RwLock<AgentStatus>>,
    cycle_tx: mpsc::Sender<CycleJob>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "control socket listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let home = home.clone();
                let config = config.clone();
                let status = status.clone();
                let cycle_tx = cycle_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) =
                        handle_socket_client(stream, home, config, status, cycle_tx, shutdown_tx).await
                    {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    home: PathBuf,
    config: Arc<Config>,
    status: Arc<RwLock<AgentStatus>>,
    cycle_tx: mpsc::Sender<CycleJob>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("agent socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request.cmd.as_str() {
            CMD_STATUS => {
                let payload = build_status_payload(&home, &config, &*status.read().await);
                DaemonResponse::ok(payload)
            }
            CMD_SYNC => match enqueue_cycle(&cycle_tx, "socket").await {
                Ok(report) => DaemonResponse::ok(report),
                Err(err) => DaemonResponse::error(err.to_string()),
            },
            CMD_STOP => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if request.cmd == CMD_STOP {
            break;
        }
    }

    Ok(())
}

fn build_status_payload(home: &Path, config: &Config, status: &AgentStatus) -> Value {
    json!({
        "running": true,
        "pid": std::process::id(),
        "started_at_unix": status.started_at_unix,
        "last_cycle_at_unix": status.last_cycle_at_unix,
        "cycles": status.cycles,
        "skipped_cycles": status.skipped_cycles,
        "failed_cycles": status.failed_cycles,
        "last_report": status.last_report,
        "last_error": status.last_error,
        "todo_dir": config.todo_dir.display().to_string(),
        "remote_folder": config.remote_folder,
        "comparison": config.comparison,
        "poll_interval_secs": config.poll_interval.as_secs(),
        "socket": socket_path(home).display().to_string(),
        "log": log_path(home).display().to_string(),
    })
}

async fn enqueue_cycle(
    cycle_tx: &mpsc::Sender<CycleJob>,
    source: &'static str,
) -> Result<Value, DaemonError> {
    let (tx, rx) = oneshot::channel();
    cycle_tx
        .send(CycleJob {
            source,
            respond_to: tx,
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("cycle queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("cycle response"))?;
    outcome.map_err(DaemonError::Protocol)
}

async fn log_rotation_task(
    home: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(LOG_ROTATION_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let home = home.clone();
                // rotate_logs reports its own failures
                let _ = tokio::task::spawn_blocking(move || crate::log_rotation::rotate_logs(&home)).await;
            }
        }
    }
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "agent socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale agent socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    for dir in [state_root(home), logs_dir(home)] {
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("agent socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("agent socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("agent socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// stdout plus `agent.log`; `log` records from the library crates are bridged.
fn init_tracing(home: &Path) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let _ = fs::create_dir_all(logs_dir(home));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(AppendLog::new(log_path(home)));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;
    use todosync_core::MemoryStore;
    use todosync_sync::LogNotifier;

    use crate::protocol::{request_status, request_stop, request_sync};

    fn agent_in(home: &Path, store: Arc<MemoryStore>) -> Agent {
        let mut config = Config::defaults_at(home).expect("defaults");
        config.poll_interval = Duration::from_secs(3600);
        config.remote_utc_offset_minutes = Some(0);
        Agent::new(config, store, Arc::new(LogNotifier))
    }

    async fn wait_for_socket(socket: &Path) {
        for _ in 0..200 {
            if socket.exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("socket {} never appeared", socket.display());
    }

    async fn blocking<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
        tokio::task::spawn_blocking(f).await.expect("blocking call")
    }

    #[test]
    fn status_payload_before_any_cycle() {
        let home = TempDir::new().expect("home");
        let config = Config::defaults_at(home.path()).expect("defaults");
        let payload = build_status_payload(home.path(), &config, &AgentStatus::new(1_000_000));

        assert_eq!(payload["running"], json!(true));
        assert_eq!(payload["started_at_unix"], json!(1_000_000u64));
        assert_eq!(payload["cycles"], json!(0u64));
        assert_eq!(payload["last_report"], Value::Null);
        assert_eq!(payload["comparison"], json!("content"));
        assert_eq!(payload["remote_folder"], json!("/todos"));
    }

    #[test]
    fn failed_cycle_is_counted_and_reported() {
        let mut status = AgentStatus::new(0);
        let err = SyncError::Io {
            path: PathBuf::from("/nowhere"),
            source: std::io::Error::new(ErrorKind::PermissionDenied, "denied"),
        };
        let outcome = status.record("timer", Err(err));

        assert!(outcome.is_err());
        assert_eq!(status.failed_cycles, 1);
        assert_eq!(status.cycles, 0);
        assert!(status.last_error.as_deref().unwrap_or("").contains("/nowhere"));
        assert!(status.last_cycle_at_unix > 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn agent_serves_status_sync_and_stop() {
        let home = TempDir::new().expect("home");
        let store = Arc::new(MemoryStore::new());
        let agent = agent_in(home.path(), store.clone());
        let todo_dir = agent.config().todo_dir.clone();
        let cache_dir = agent.config().cache_dir();
        fs::create_dir_all(&todo_dir).expect("todo dir");
        fs::write(todo_dir.join("work.todo"), "ship it\n").expect("write todo");

        let handle = tokio::spawn(run(home.path().to_path_buf(), agent));
        let socket = socket_path(home.path());
        wait_for_socket(&socket).await;

        let home_path = home.path().to_path_buf();
        let status = blocking(move || request_status(&home_path)).await.expect("status");
        assert_eq!(status["running"], json!(true));

        let home_path = home.path().to_path_buf();
        let report = blocking(move || request_sync(&home_path)).await.expect("sync");
        assert!(report.get("plan").is_some(), "sync returns the cycle report");
        assert_eq!(store.bytes("/todos/work.todo").as_deref(), Some(&b"ship it\n"[..]));

        let home_path = home.path().to_path_buf();
        let status = blocking(move || request_status(&home_path)).await.expect("status");
        assert!(status["cycles"].as_u64().unwrap_or(0) >= 1);
        assert!(status["last_report"].is_object());

        let home_path = home.path().to_path_buf();
        blocking(move || request_stop(&home_path)).await.expect("stop");

        let result = tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("agent exits after stop")
            .expect("join");
        assert!(result.is_ok(), "agent returned {result:?}");
        assert!(!socket.exists(), "socket removed on exit");
        assert!(!cache_dir.exists(), "cache mirror cleared on exit");
    }

    #[tokio::test]
    async fn busy_socket_refuses_second_agent() {
        let home = TempDir::new().expect("home");
        fs::create_dir_all(state_root(home.path())).expect("state dir");
        let socket = socket_path(home.path());
        let _listener = std::os::unix::net::UnixListener::bind(&socket).expect("bind");

        let agent = agent_in(home.path(), Arc::new(MemoryStore::new()));
        let err = run(home.path().to_path_buf(), agent).await.unwrap_err();
        assert!(err.to_string().contains("already in use"), "got {err}");
    }

    #[test]
    fn missing_credential_is_fatal() {
        let home = TempDir::new().expect("home");
        let config = Config::defaults_at(home.path()).expect("defaults");
        let err = Agent::from_config(config).err().expect("no token file");
        assert!(matches!(
            err,
            DaemonError::Config(todosync_core::ConfigError::MissingCredential { .. })
        ));
    }
}

//! Notification sinks. Fire-and-forget; never consulted for control flow.

use std::process::{Command, Stdio};

use todosync_core::Config;

pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        tracing::info!("{}: {}", title, body);
    }
}

/// Desktop notifications through `notify-send`, also logged.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    program: String,
}

impl DesktopNotifier {
    pub fn new() -> Self {
        Self::with_program("notify-send")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, body: &str) {
        LogNotifier.notify(title, body);
        let status = Command::new(&self.program)
            .arg(title)
            .arg(body)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(status) if !status.success() => {
                tracing::debug!("{} exited with {}", self.program, status)
            }
            Ok(_) => {}
            Err(err) => tracing::debug!("{} unavailable: {}", self.program, err),
        }
    }
}

/// The sink selected by `desktop_notifications`.
pub fn from_config(config: &Config) -> Box<dyn Notifier> {
    if config.desktop_notifications {
        Box::new(DesktopNotifier::new())
    } else {
        Box::new(LogNotifier)
    }
}

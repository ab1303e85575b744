//! The todosync agent: poll loop, control socket, and log file handling.
//!
//! [`start_blocking`] loads the configuration, bootstraps, and then runs a
//! sync cycle every poll interval until stopped. The CLI talks to a running
//! agent through [`protocol`].

mod error;
pub mod log_rotation;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use protocol::{
    request_status, request_stop, request_sync, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking, Agent, AgentStatus};

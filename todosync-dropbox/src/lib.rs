//! Dropbox HTTP API v2 implementation of [`todosync_core::RemoteStore`].
//!
//! - [`client`]: [`DropboxClient`]: list, upload, download
//! - [`retry`]: [`RetryPolicy`] for transient failures
//! - `wire`: request/response shapes and the `Dropbox-API-Arg` encoding

pub mod client;
pub mod retry;
mod wire;

pub use client::DropboxClient;
pub use retry::RetryPolicy;

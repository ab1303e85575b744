//! Blocking Dropbox client.
//!
//! ```text
//! POST {api_url}/files/list_folder            JSON body {path}
//! POST {api_url}/files/list_folder/continue   JSON body {cursor}
//! POST {content_url}/files/upload             Dropbox-API-Arg {path, mode: overwrite}
//! POST {content_url}/files/download           Dropbox-API-Arg {path}
//! ```

use std::io::Read;
use std::time::Duration;

use serde_json::json;
use todosync_core::{Config, Credential, RemoteEntry, RemoteError, RemoteStore};

use crate::retry::RetryPolicy;
use crate::wire::{api_arg, api_folder, ListFolderPage};

const API_ARG_HEADER: &str = "Dropbox-API-Arg";

/// [`RemoteStore`] backed by the Dropbox HTTP API.
pub struct DropboxClient {
    agent: ureq::Agent,
    token: Credential,
    api_url: String,
    content_url: String,
    retry: RetryPolicy,
}

impl DropboxClient {
    pub fn new(
        token: Credential,
        api_url: impl Into<String>,
        content_url: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            token,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            content_url: content_url.into().trim_end_matches('/').to_string(),
            retry,
        }
    }

    pub fn from_config(config: &Config, token: Credential) -> Self {
        Self::new(
            token,
            config.api_url.clone(),
            config.content_url.clone(),
            config.request_timeout,
            RetryPolicy::from_config(config),
        )
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token.expose())
    }

    fn rpc(&self, endpoint: &str, body: &serde_json::Value) -> Result<ListFolderPage, RemoteError> {
        let url = format!("{}/{}", self.api_url, endpoint);
        let response = self
            .agent
            .post(&url)
            .set("Authorization", &self.bearer())
            .send_json(body)
            .map_err(map_error)?;
        response
            .into_json::<ListFolderPage>()
            .map_err(|e| RemoteError::Decode(format!("{endpoint}: {e}")))
    }
}

impl std::fmt::Debug for DropboxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DropboxClient")
            .field("api_url", &self.api_url)
            .field("content_url", &self.content_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl RemoteStore for DropboxClient {
    fn list_folder(&self, folder: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let first = self.retry.run("list_folder", || {
            self.rpc("files/list_folder", &json!({ "path": api_folder(folder) }))
        })?;

        let mut entries: Vec<RemoteEntry> = Vec::new();
        let mut page = first;
        loop {
            entries.extend(page.entries.into_iter().map(RemoteEntry::from));
            if !page.has_more {
                break;
            }
            let cursor = page.cursor;
            page = self.retry.run("list_folder/continue", || {
                self.rpc("files/list_folder/continue", &json!({ "cursor": cursor }))
            })?;
        }
        tracing::debug!("listed {} entries under {}", entries.len(), folder);
        Ok(entries)
    }

    fn upload(&self, path: &str, bytes: &[u8]) -> Result<(), RemoteError> {
        let url = format!("{}/files/upload", self.content_url);
        let arg = api_arg(&json!({ "path": path, "mode": { ".tag": "overwrite" } }));
        self.retry.run("upload", || {
            self.agent
                .post(&url)
                .set("Authorization", &self.bearer())
                .set("Content-Type", "application/octet-stream")
                .set(API_ARG_HEADER, &arg)
                .send_bytes(bytes)
                .map(drop)
                .map_err(map_error)
        })?;
        tracing::debug!("uploaded {} bytes to {}", bytes.len(), path);
        Ok(())
    }

    fn download(&self, path: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        let url = format!("{}/files/download", self.content_url);
        let arg = api_arg(&json!({ "path": path }));
        let result = self.retry.run("download", || {
            let response = self
                .agent
                .post(&url)
                .set("Authorization", &self.bearer())
                .set(API_ARG_HEADER, &arg)
                .call()
                .map_err(map_error)?;
            let mut bytes = Vec::new();
            response
                .into_reader()
                .read_to_end(&mut bytes)
                .map_err(|e| RemoteError::Transport(format!("reading {path}: {e}")))?;
            Ok(bytes)
        });
        match result {
            Ok(bytes) => Ok(Some(bytes)),
            Err(RemoteError::Status { code: 409, message }) if message.contains("not_found") => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

fn map_error(err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            RemoteError::Status {
                code,
                message: summarize(&body),
            }
        }
        ureq::Error::Transport(transport) => RemoteError::Transport(transport.to_string()),
    }
}

/// Prefer the API's `error_summary`; otherwise the first line of the body.
fn summarize(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error_summary")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.lines().next().unwrap_or_default().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_prefers_error_summary() {
        let body = r#"{"error_summary": "path/not_found/..", "error": {".tag": "path"}}"#;
        assert_eq!(summarize(body), "path/not_found/..");
    }

    #[test]
    fn summary_falls_back_to_first_line() {
        assert_eq!(summarize("Error in call to API\nmore"), "Error in call to API");
        assert_eq!(summarize(""), "");
    }

    #[test]
    fn debug_never_shows_token() {
        let client = DropboxClient::new(
            Credential::new("sl.secret"),
            "http://localhost/2",
            "http://localhost/2",
            Duration::from_secs(1),
            RetryPolicy::none(),
        );
        assert!(!format!("{client:?}").contains("sl.secret"));
    }
}

//! `DropboxClient` against an in-process HTTP responder.
//!
//! Each test starts its own listener on an ephemeral port; every response is
//! sent with `Connection: close` so each request arrives on a new socket.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use todosync_core::{Credential, EntryTag, RemoteError, RemoteStore};
use todosync_dropbox::{DropboxClient, RetryPolicy};

#[derive(Debug, Clone)]
struct Recorded {
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

type Handler = dyn Fn(&Recorded, usize) -> (u16, Vec<u8>) + Send + Sync;

struct MockServer {
    base: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockServer {
    /// `handler` receives the request and its zero-based sequence number.
    fn start(handler: impl Fn(&Recorded, usize) -> (u16, Vec<u8>) + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let base = format!("http://{}/2", listener.local_addr().expect("addr"));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);
        let handler: Arc<Handler> = Arc::new(handler);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let Some(request) = read_request(&mut stream) else { continue };
                let index = {
                    let mut seen = seen.lock().unwrap();
                    seen.push(request.clone());
                    seen.len() - 1
                };
                let (code, body) = handler(&request, index);
                let head = format!(
                    "HTTP/1.1 {code} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    if code < 400 { "OK" } else { "Error" },
                    body.len()
                );
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(&body);
                let _ = stream.flush();
            }
        });

        Self { base, requests }
    }

    fn client(&self, retry: RetryPolicy) -> DropboxClient {
        DropboxClient::new(
            Credential::new("sl.test-token"),
            self.base.clone(),
            self.base.clone(),
            Duration::from_secs(5),
            retry,
        )
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

fn read_request(stream: &mut std::net::TcpStream) -> Option<Recorded> {
    let mut reader = BufReader::new(stream.try_clone().ok()?);
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let path = line.split_whitespace().nth(1)?.to_string();

    let mut headers = HashMap::new();
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).ok()?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let length = headers
        .get("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).ok()?;
    Some(Recorded {
        path,
        headers,
        body,
    })
}

fn json_body(value: serde_json::Value) -> Vec<u8> {
    value.to_string().into_bytes()
}

// ---------------------------------------------------------------------------
// 1. Listing
// ---------------------------------------------------------------------------

#[test]
fn list_folder_follows_cursor() {
    let server = MockServer::start(|request, _| {
        if request.path.ends_with("/files/list_folder") {
            (
                200,
                json_body(serde_json::json!({
                    "entries": [
                        {".tag": "file", "name": "a.todo", "size": 3,
                         "server_modified": "2020-03-22T14:33:23Z", "content_hash": "aa"},
                        {".tag": "folder", "name": "archive"}
                    ],
                    "cursor": "page-2",
                    "has_more": true
                })),
            )
        } else {
            (
                200,
                json_body(serde_json::json!({
                    "entries": [
                        {".tag": "file", "name": "b.todo", "size": 5,
                         "server_modified": "2020-03-22T15:00:00Z"}
                    ],
                    "cursor": "page-3",
                    "has_more": false
                })),
            )
        }
    });

    let entries = server.client(RetryPolicy::none()).list_folder("/todos").unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["a.todo", "archive", "b.todo"]);
    assert_eq!(entries[1].tag, EntryTag::Folder);
    assert_eq!(entries[2].content_hash, None);

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].path, "/2/files/list_folder");
    assert_eq!(
        requests[0].headers.get("authorization").map(String::as_str),
        Some("Bearer sl.test-token")
    );
    let first: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(first["path"], "/todos");
    assert_eq!(requests[1].path, "/2/files/list_folder/continue");
    let second: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert_eq!(second["cursor"], "page-2");
}

#[test]
fn missing_folder_is_a_status_error() {
    let server = MockServer::start(|_, _| {
        (
            409,
            json_body(serde_json::json!({
                "error_summary": "path/not_found/..",
                "error": {".tag": "path", "path": {".tag": "not_found"}}
            })),
        )
    });
    let err = server
        .client(RetryPolicy::new(3, Duration::from_millis(1)))
        .list_folder("/todos")
        .unwrap_err();
    match err {
        RemoteError::Status { code, message } => {
            assert_eq!(code, 409);
            assert!(message.contains("not_found"));
        }
        other => panic!("expected status error, got {other:?}"),
    }
    assert_eq!(server.requests().len(), 1, "409 must not be retried");
}

// ---------------------------------------------------------------------------
// 2. Transfers
// ---------------------------------------------------------------------------

#[test]
fn upload_sends_overwrite_arg_and_raw_bytes() {
    let server = MockServer::start(|_, _| (200, json_body(serde_json::json!({"name": "é.todo"}))));
    server
        .client(RetryPolicy::none())
        .upload("/todos/é.todo", b"- buy milk\n")
        .unwrap();

    let requests = server.requests();
    assert_eq!(requests[0].path, "/2/files/upload");
    assert_eq!(requests[0].body, b"- buy milk\n");
    assert_eq!(
        requests[0].headers.get("content-type").map(String::as_str),
        Some("application/octet-stream")
    );
    let arg = requests[0].headers.get("dropbox-api-arg").unwrap();
    assert!(arg.is_ascii());
    let arg: serde_json::Value = serde_json::from_str(arg).unwrap();
    assert_eq!(arg["path"], "/todos/é.todo");
    assert_eq!(arg["mode"][".tag"], "overwrite");
}

#[test]
fn download_returns_bytes() {
    let server = MockServer::start(|_, _| (200, b"- call mum\n".to_vec()));
    let bytes = server
        .client(RetryPolicy::none())
        .download("/todos/home.todo")
        .unwrap();
    assert_eq!(bytes.as_deref(), Some(&b"- call mum\n"[..]));
    let requests = server.requests();
    assert_eq!(requests[0].path, "/2/files/download");
    let arg: serde_json::Value =
        serde_json::from_str(requests[0].headers.get("dropbox-api-arg").unwrap()).unwrap();
    assert_eq!(arg["path"], "/todos/home.todo");
}

#[test]
fn download_of_missing_path_is_none() {
    let server = MockServer::start(|_, _| {
        (
            409,
            json_body(serde_json::json!({"error_summary": "path/not_found/.."})),
        )
    });
    let result = server
        .client(RetryPolicy::none())
        .download("/todos/gone.todo")
        .unwrap();
    assert!(result.is_none());
}

// ---------------------------------------------------------------------------
// 3. Retry
// ---------------------------------------------------------------------------

#[test]
fn transient_failure_is_retried() {
    let server = MockServer::start(|_, index| {
        if index == 0 {
            (503, b"upstream busy".to_vec())
        } else {
            (200, b"{}".to_vec())
        }
    });
    server
        .client(RetryPolicy::new(2, Duration::from_millis(1)))
        .upload("/todos/a.todo", b"x")
        .unwrap();
    assert_eq!(server.requests().len(), 2);
}

#[test]
fn auth_failure_is_not_retried() {
    let server = MockServer::start(|_, _| {
        (
            401,
            json_body(serde_json::json!({"error_summary": "invalid_access_token/"})),
        )
    });
    let err = server
        .client(RetryPolicy::new(2, Duration::from_millis(1)))
        .upload("/todos/a.todo", b"x")
        .unwrap_err();
    assert!(matches!(err, RemoteError::Status { code: 401, .. }));
    assert_eq!(server.requests().len(), 1);
}

#[test]
fn unreachable_host_is_a_transport_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let base = format!("http://127.0.0.1:{port}/2");
    let client = DropboxClient::new(
        Credential::new("t"),
        base.clone(),
        base,
        Duration::from_secs(2),
        RetryPolicy::none(),
    );
    let err = client.list_folder("/todos").unwrap_err();
    assert!(matches!(err, RemoteError::Transport(_)), "got {err:?}");
    assert!(err.is_retryable());
}

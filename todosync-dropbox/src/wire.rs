use serde::Deserialize;
use todosync_core::{EntryTag, RemoteEntry};

/// One page of `/files/list_folder` or `/files/list_folder/continue`.
#[derive(Debug, Deserialize)]
pub(crate) struct ListFolderPage {
    pub entries: Vec<WireEntry>,
    pub cursor: String,
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = ".tag", rename_all = "lowercase")]
pub(crate) enum WireEntry {
    File {
        name: String,
        size: u64,
        server_modified: String,
        #[serde(default)]
        content_hash: Option<String>,
    },
    Folder {
        name: String,
    },
    Deleted {
        name: String,
    },
}

impl From<WireEntry> for RemoteEntry {
    fn from(entry: WireEntry) -> Self {
        match entry {
            WireEntry::File {
                name,
                size,
                server_modified,
                content_hash,
            } => RemoteEntry {
                tag: EntryTag::File,
                name,
                size,
                server_modified,
                content_hash,
            },
            WireEntry::Folder { name } => RemoteEntry {
                tag: EntryTag::Folder,
                name,
                size: 0,
                server_modified: String::new(),
                content_hash: None,
            },
            WireEntry::Deleted { name } => RemoteEntry {
                tag: EntryTag::Deleted,
                name,
                size: 0,
                server_modified: String::new(),
                content_hash: None,
            },
        }
    }
}

/// Folder path as the API expects it: the root is the empty string.
pub(crate) fn api_folder(folder: &str) -> &str {
    if folder == "/" {
        ""
    } else {
        folder
    }
}

/// Encode `value` for the `Dropbox-API-Arg` header.
///
/// HTTP header values must be ASCII, so every non-ASCII character (and DEL)
/// is written as a JSON `\uXXXX` escape, using surrogate pairs above the BMP.
pub(crate) fn api_arg(value: &serde_json::Value) -> String {
    let json = value.to_string();
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() && c != '\u{7f}' {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}

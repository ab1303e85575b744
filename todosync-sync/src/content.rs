//! Content hashing in the Dropbox `content_hash` format.
//!
//! ```text
//! blocks  = input split into 4 MiB chunks (last one may be shorter)
//! digest  = hex(SHA-256(SHA-256(block_0) || SHA-256(block_1) || ...))
//! ```
//!
//! Local files hashed this way compare directly against the `content_hash`
//! the store reports in folder listings.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{io_err, SyncError};

pub const BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Hash an in-memory buffer.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut outer = Sha256::new();
    for block in bytes.chunks(BLOCK_SIZE) {
        outer.update(Sha256::digest(block));
    }
    hex::encode(outer.finalize())
}

/// Hash everything `reader` yields, one block at a time.
pub fn hash_reader(mut reader: impl Read) -> std::io::Result<String> {
    let mut outer = Sha256::new();
    let mut block = vec![0u8; BLOCK_SIZE];
    loop {
        let filled = fill_block(&mut reader, &mut block)?;
        if filled == 0 {
            break;
        }
        outer.update(Sha256::digest(&block[..filled]));
        if filled < BLOCK_SIZE {
            break;
        }
    }
    Ok(hex::encode(outer.finalize()))
}

/// Hash a file. `Ok(None)` when the file does not exist.
pub fn hash_file(path: &Path) -> Result<Option<String>, SyncError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(path, err)),
    };
    hash_reader(file).map(Some).map_err(|e| io_err(path, e))
}

fn fill_block(reader: &mut impl Read, block: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < block.len() {
        match reader.read(&mut block[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

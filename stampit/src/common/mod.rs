//! Items shared by the API handlers and the ledger jobs.

use std::io::Write as _;
use std::path::Path;

use crate::common::error::Error;

pub mod error;

/// Parse a hex encoded SHA-256 digest. Both cases are accepted.
pub fn parse_sha256_hex(hash: &str) -> Result<[u8; 32], Error> {
    if hash.len() != 64 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::InvalidHash(hash.to_string()));
    }
    let mut digest = [0u8; 32];
    hex::decode_to_slice(hash, &mut digest).map_err(|_| Error::InvalidHash(hash.to_string()))?;
    Ok(digest)
}

/// Write `contents` to `path` through a uniquely named temporary sibling
/// file and a rename, so readers never see a partial file. Concurrent
/// writers of one path each get their own temporary file and the last
/// rename wins.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), Error> {
    let path = path.to_path_buf();
    let contents = contents.to_vec();
    tokio::task::spawn_blocking(move || write_atomic_blocking(&path, &contents)).await?
}

fn write_atomic_blocking(path: &Path, contents: &[u8]) -> Result<(), Error> {
    let io_err = |err: std::io::Error| Error::Io(err, path.display().to_string());

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(io_err)?;

    let mut file = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
    file.write_all(contents).map_err(io_err)?;
    file.as_file().sync_all().map_err(io_err)?;
    file.persist(path).map_err(|err| io_err(err.error))?;
    Ok(())
}

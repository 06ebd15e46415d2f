//! Storage for receipts created through the API, one `<hash>.ots` file per
//! stamped digest.

use std::path::PathBuf;

use crate::common::error::Error;
use crate::common::write_atomic;

/// A directory of receipts keyed by the lowercase hex digest.
#[derive(Debug, Clone)]
pub struct ReceiptStore {
    dir: PathBuf,
}

impl ReceiptStore {
    /// Create a store rooted at `dir`. The directory is created on the
    /// first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The file name of the receipt for `digest`.
    pub fn filename(digest: &[u8; 32]) -> String {
        format!("{}.ots", hex::encode(digest))
    }

    /// Where the receipt for `digest` lives.
    pub fn path_for(&self, digest: &[u8; 32]) -> PathBuf {
        self.dir.join(Self::filename(digest))
    }

    /// Store the receipt for `digest`, replacing any previous one.
    pub async fn save(&self, digest: &[u8; 32], receipt: &[u8]) -> Result<PathBuf, Error> {
        let path = self.path_for(digest);
        write_atomic(&path, receipt).await?;
        tracing::debug!(path = %path.display(), size = receipt.len(), "stored receipt");
        Ok(path)
    }

    /// Load the receipt for `digest`, if one is stored.
    pub async fn load(&self, digest: &[u8; 32]) -> Result<Option<Vec<u8>>, Error> {
        let path = self.path_for(digest);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::Io(err, path.display().to_string())),
        }
    }
}

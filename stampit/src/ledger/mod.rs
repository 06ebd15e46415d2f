//! The ledger of stamped hashes
//!
//! The ledger is a JSON file with the entries and a metadata block whose
//! counters are recomputed on every save. The maintenance jobs in
//! [`maintenance`], [`restamp`] and [`updater`] load it, mutate the entries
//! and write it back.

use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::common::error::Error;
use crate::common::write_atomic;

pub mod entry;
pub mod maintenance;
pub mod restamp;
pub mod updater;

pub use entry::Confirmation;
pub use entry::EntryStatus;
pub use entry::LedgerEntry;

/// Counters describing the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerMetadata {
    /// When the ledger was last written
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
    /// Number of entries
    pub total_entries: usize,
    /// Number of confirmed entries
    pub confirmed_entries: usize,
    /// Number of pending entries
    pub pending_entries: usize,
}

impl Default for LedgerMetadata {
    fn default() -> Self {
        Self {
            last_updated: OffsetDateTime::UNIX_EPOCH,
            total_entries: 0,
            confirmed_entries: 0,
            pending_entries: 0,
        }
    }
}

/// The ledger file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    /// The records, in insertion order
    pub entries: Vec<LedgerEntry>,
    /// Summary counters
    #[serde(default)]
    pub metadata: LedgerMetadata,
}

impl Ledger {
    /// Read and parse the ledger at `path`.
    pub async fn load(path: &Path) -> Result<Self, Error> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| Error::Io(err, path.display().to_string()))?;
        let ledger: Ledger = serde_json::from_slice(&bytes)
            .map_err(|err| Error::LedgerParse(err, path.display().to_string()))?;

        tracing::debug!(path = %path.display(), entries = ledger.entries.len(), "loaded ledger");
        Ok(ledger)
    }

    /// Recompute the metadata and write the ledger to `path` as pretty
    /// printed JSON.
    pub async fn save(&mut self, path: &Path) -> Result<(), Error> {
        self.refresh_metadata(OffsetDateTime::now_utc());

        let mut bytes = serde_json::to_vec_pretty(self).map_err(Error::LedgerSerialize)?;
        bytes.push(b'\n');
        write_atomic(path, &bytes).await?;

        tracing::info!(
            path = %path.display(),
            total = self.metadata.total_entries,
            confirmed = self.metadata.confirmed_entries,
            pending = self.metadata.pending_entries,
            "saved ledger"
        );
        Ok(())
    }

    /// Recompute the counters from the entries.
    pub fn refresh_metadata(&mut self, now: OffsetDateTime) {
        let count = |status| self.entries.iter().filter(|e| e.status == status).count();
        self.metadata = LedgerMetadata {
            last_updated: now,
            total_entries: self.entries.len(),
            confirmed_entries: count(EntryStatus::Confirmed),
            pending_entries: count(EntryStatus::Pending),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ledger_entry;

    #[tokio::test]
    async fn save_recomputes_metadata_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        let mut confirmed = ledger_entry("manual-2", &[0x22; 32]);
        confirmed.status = EntryStatus::Confirmed;
        confirmed.block_height = Some(840_000);
        let mut ledger = Ledger {
            entries: vec![ledger_entry("manual-1", &[0x11; 32]), confirmed],
            metadata: LedgerMetadata::default(),
        };

        ledger.save(&path).await.unwrap();

        assert_eq!(ledger.metadata.total_entries, 2);
        assert_eq!(ledger.metadata.confirmed_entries, 1);
        assert_eq!(ledger.metadata.pending_entries, 1);
        assert!(ledger.metadata.last_updated > OffsetDateTime::UNIX_EPOCH);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("{\n  \"entries\": [\n    {"));
        assert!(text.contains("\"totalEntries\": 2"));

        assert_eq!(Ledger::load(&path).await.unwrap(), ledger);
    }

    #[tokio::test]
    async fn metadata_is_optional_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, r#"{ "entries": [] }"#).unwrap();

        let ledger = Ledger::load(&path).await.unwrap();
        assert!(ledger.entries.is_empty());
        assert_eq!(ledger.metadata, LedgerMetadata::default());
    }

    #[tokio::test]
    async fn malformed_ledger_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, "[]").unwrap();

        assert!(matches!(Ledger::load(&path).await, Err(Error::LedgerParse(_, _))));
    }
}

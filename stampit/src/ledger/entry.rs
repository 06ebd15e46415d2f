//! A single ledger record.

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::common::error::Error;
use crate::common::parse_sha256_hex;

/// Confirmation state of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Waiting for a Bitcoin attestation.
    Pending,
    /// Anchored in a Bitcoin block.
    Confirmed,
}

impl EntryStatus {
    /// The lowercase name used in the ledger file.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Confirmed => "confirmed",
        }
    }
}

/// What a receipt proves about an entry once it is anchored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    /// Height of the attested block
    pub block_height: u64,
    /// Anchoring transaction, when it can be read from the receipt
    pub txid: Option<String>,
    /// Block time, known only with a block-header source
    pub block_time: Option<OffsetDateTime>,
}

/// A stamped hash and where its receipt lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Unique identifier. Entries created by automation start with `auto-`.
    pub id: String,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// Lowercase hex SHA-256 of the stamped file
    pub sha256: String,
    /// Receipt location, relative to the public directory
    pub receipt_url: String,
    /// Confirmation state
    pub status: EntryStatus,
    /// Anchoring transaction id
    #[serde(default)]
    pub txid: Option<String>,
    /// Height of the anchoring block
    #[serde(default)]
    pub block_height: Option<u64>,
    /// Time of the anchoring block
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub block_time: Option<OffsetDateTime>,
    /// When the hash was submitted to the calendars
    #[serde(with = "time::serde::rfc3339")]
    pub stamped_at: OffsetDateTime,
    /// Free-form labels
    #[serde(default)]
    pub tags: Vec<String>,
}

impl LedgerEntry {
    /// The stamped digest. Fails if `sha256` is not 64 hex characters.
    pub fn digest(&self) -> Result<[u8; 32], Error> {
        parse_sha256_hex(&self.sha256)
    }

    /// Whether the entry was created by automation.
    pub fn is_automatic(&self) -> bool {
        self.id.starts_with("auto-")
    }

    /// Move a pending entry to confirmed. Confirmed entries are left
    /// untouched; returns whether the entry changed.
    pub fn confirm(&mut self, confirmation: Confirmation) -> bool {
        if self.status == EntryStatus::Confirmed {
            return false;
        }
        self.status = EntryStatus::Confirmed;
        self.block_height = Some(confirmation.block_height);
        self.txid = confirmation.txid;
        self.block_time = confirmation.block_time;
        true
    }
}

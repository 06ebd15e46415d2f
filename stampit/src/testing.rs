//! Module with testing utility functions.

#![allow(clippy::unwrap_in_result, clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;

use ots::attestation::Attestation;
use ots::Timestamp;
use time::macros::datetime;
use tempfile::TempDir;
use url::Url;

use crate::config::Settings;
use crate::context::ApiContext;
use crate::ledger::EntryStatus;
use crate::ledger::LedgerEntry;

/// Clean all `STAMPIT_` environment variables.
pub fn clear_env() {
    for var in std::env::vars() {
        if var.0.starts_with("STAMPIT_") {
            std::env::remove_var(var.0);
        }
    }
}

impl Settings {
    /// Create a new `Settings` instance from the compiled in defaults and
    /// the environment.
    pub fn new_from_default_config() -> Result<Self, config::ConfigError> {
        Self::new(None::<&str>)
    }
}

/// A pending ledger entry for `digest` whose receipt lives under
/// `/receipts/`.
pub fn ledger_entry(id: &str, digest: &[u8; 32]) -> LedgerEntry {
    let sha256 = hex::encode(digest);
    LedgerEntry {
        id: id.to_string(),
        title: format!("Document {id}"),
        receipt_url: format!("/receipts/{sha256}.ots"),
        sha256,
        status: EntryStatus::Pending,
        txid: None,
        block_height: None,
        block_time: None,
        stamped_at: datetime!(2025-01-01 00:00:00 UTC),
        tags: Vec::new(),
    }
}

/// Write `receipt` where the receipt of `entry` is looked up under
/// `public_dir`.
pub fn write_receipt(public_dir: &Path, entry: &LedgerEntry, receipt: &[u8]) {
    let path = public_dir.join(entry.receipt_url.trim_start_matches('/'));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, receipt).unwrap();
}

/// An API context backed by temporary directories and a mock calendar.
pub struct TestContext {
    /// The context handed to the routes
    pub context: ApiContext,
    /// The only calendar in the pool
    pub calendar: mockito::ServerGuard,
    _dir: TempDir,
}

impl TestContext {
    /// Create a context whose single calendar is a mock server and whose
    /// files live in a fresh temporary directory.
    pub async fn new() -> Self {
        let calendar = mockito::Server::new_async().await;
        let dir = tempfile::tempdir().unwrap();

        let mut settings = Settings::new_from_default_config().unwrap();
        settings.stamp.calendars = vec![Url::parse(&calendar.url()).unwrap()];
        settings.stamp.min_calendar_responses = 1;
        settings.bitcoin.esplora_url = None;
        settings.bitcoin.rpc_endpoint = None;
        settings.ledger.path = dir.path().join("ledger.json");
        settings.ledger.public_dir = dir.path().join("public");
        settings.ledger.receipts_dir = dir.path().join("receipts");

        let context = ApiContext::from_settings(settings).unwrap();
        Self { context, calendar, _dir: dir }
    }

    /// Make the calendar accept every submitted digest with a pending
    /// attestation pointing back at itself.
    pub async fn mock_calendar_submission(&mut self) -> mockito::Mock {
        let mut answer = Timestamp::new(vec![0; 32]);
        answer.add_attestation(Attestation::Pending { uri: self.calendar.url() });

        self.calendar
            .mock("POST", "/digest")
            .with_status(200)
            .with_body(answer.to_bytes().unwrap())
            .create_async()
            .await
    }
}

//! Re-stamping receipts the calendars lost.
//!
//! A calendar that never anchors a submission keeps answering 404 for the
//! commitment, and the receipt stays at the few bytes of its pending
//! attestation. Entries that are still pending after [`LOST_AFTER`] with a
//! receipt below [`LOST_RECEIPT_MAX_SIZE`] are submitted again. The old
//! receipt is kept next to the new one with a `.lost` suffix.

use std::collections::HashSet;

use ots::calendar::CalendarPool;
use serde::Serialize;
use time::Duration;
use time::OffsetDateTime;

use crate::common::error::Error;
use crate::common::write_atomic;
use crate::ledger::maintenance::ReceiptChecker;
use crate::ledger::EntryStatus;
use crate::ledger::Ledger;
use crate::ledger::LedgerEntry;

/// Age after which a pending receipt that never grew counts as lost.
pub const LOST_AFTER: Duration = Duration::days(3);

/// Receipts smaller than this have nothing beyond pending attestations.
pub const LOST_RECEIPT_MAX_SIZE: u64 = 200;

/// Suffix of the copy kept of a replaced receipt.
pub const LOST_SUFFIX: &str = ".lost";

/// A pending entry whose receipt looks lost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LostReceipt {
    /// Ledger entry id
    pub id: String,
    /// Whole days since the entry was stamped
    pub age_days: i64,
    /// Receipt size in bytes
    pub size: u64,
}

/// The outcome of a re-stamp run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestampReport {
    /// Entries found with lost receipts
    pub lost: Vec<LostReceipt>,
    /// Entries stamped again
    pub restamped: usize,
    /// Entries that could not be stamped again
    pub failed: usize,
    /// Per-entry failures, as `<id>: <reason>`
    pub errors: Vec<String>,
}

/// Pending entries at least [`LOST_AFTER`] old at `now` whose receipt
/// exists and is smaller than [`LOST_RECEIPT_MAX_SIZE`].
pub async fn find_lost(
    ledger: &Ledger,
    checker: &ReceiptChecker,
    now: OffsetDateTime,
) -> Vec<LostReceipt> {
    let mut lost = Vec::new();

    for entry in ledger.entries.iter().filter(|e| e.status == EntryStatus::Pending) {
        let age = now - entry.stamped_at;
        if age < LOST_AFTER {
            continue;
        }
        let Ok(metadata) = tokio::fs::metadata(checker.resolve(&entry.receipt_url)).await else {
            continue;
        };
        if metadata.len() < LOST_RECEIPT_MAX_SIZE {
            lost.push(LostReceipt {
                id: entry.id.clone(),
                age_days: age.whole_days(),
                size: metadata.len(),
            });
        }
    }

    lost
}

/// Stamp every lost entry again, keep the old receipt as
/// `<receipt>.lost` and move `stampedAt` to `now`.
#[tracing::instrument(skip_all)]
pub async fn restamp_lost(
    ledger: &mut Ledger,
    checker: &ReceiptChecker,
    pool: &CalendarPool,
    now: OffsetDateTime,
) -> RestampReport {
    let lost = find_lost(ledger, checker, now).await;
    let ids: HashSet<&str> = lost.iter().map(|receipt| receipt.id.as_str()).collect();
    let mut report = RestampReport::default();

    for entry in ledger.entries.iter_mut().filter(|e| ids.contains(e.id.as_str())) {
        match restamp_entry(entry, checker, pool).await {
            Ok(size) => {
                tracing::info!(id = %entry.id, size, "receipt stamped again");
                entry.stamped_at = now;
                report.restamped += 1;
            }
            Err(error) => {
                tracing::warn!(id = %entry.id, %error, "could not stamp again");
                report.failed += 1;
                report.errors.push(format!("{}: {error}", entry.id));
            }
        }
    }

    report.lost = lost;
    report
}

async fn restamp_entry(
    entry: &LedgerEntry,
    checker: &ReceiptChecker,
    pool: &CalendarPool,
) -> Result<usize, Error> {
    let digest = entry.digest()?;
    let file = pool.stamp_digest(digest).await.map_err(Error::StampFailed)?;
    let receipt = file.to_bytes().map_err(Error::Receipt)?;

    let path = checker.resolve(&entry.receipt_url);
    let mut backup = path.clone().into_os_string();
    backup.push(LOST_SUFFIX);
    tokio::fs::copy(&path, &backup)
        .await
        .map_err(|err| Error::Io(err, path.display().to_string()))?;

    write_atomic(&path, &receipt).await?;
    Ok(receipt.len())
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use ots::attestation::Attestation;
    use ots::testing::confirmed_receipt;
    use ots::testing::pending_receipt;
    use ots::DetachedTimestampFile;
    use ots::Timestamp;
    use time::macros::datetime;
    use url::Url;

    use super::*;
    use crate::testing::ledger_entry;
    use crate::testing::write_receipt;

    const NOW: OffsetDateTime = datetime!(2025-01-10 00:00:00 UTC);

    #[tokio::test]
    async fn only_old_small_pending_receipts_are_lost() {
        let public = tempfile::tempdir().unwrap();
        let checker = ReceiptChecker::new(public.path(), None);

        let lost = ledger_entry("auto-lost", &[0x01; 32]);
        write_receipt(public.path(), &lost, &pending_receipt([0x01; 32]).to_bytes().unwrap());

        let mut recent = ledger_entry("auto-recent", &[0x02; 32]);
        recent.stamped_at = NOW - Duration::days(1);
        write_receipt(public.path(), &recent, &pending_receipt([0x02; 32]).to_bytes().unwrap());

        let grown = ledger_entry("auto-grown", &[0x03; 32]);
        let big = confirmed_receipt([0x03; 32], 840_000).to_bytes().unwrap();
        assert!(big.len() as u64 >= LOST_RECEIPT_MAX_SIZE);
        write_receipt(public.path(), &grown, &big);

        let mut confirmed = ledger_entry("auto-confirmed", &[0x04; 32]);
        confirmed.status = EntryStatus::Confirmed;
        write_receipt(public.path(), &confirmed, &pending_receipt([0x04; 32]).to_bytes().unwrap());

        let missing = ledger_entry("auto-missing", &[0x05; 32]);

        let ledger = Ledger {
            entries: vec![lost, recent, grown, confirmed, missing],
            ..Default::default()
        };

        let found = find_lost(&ledger, &checker, NOW).await;

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "auto-lost");
        assert_eq!(found[0].age_days, 9);
    }

    #[tokio::test]
    async fn lost_receipt_is_replaced_and_kept_as_backup() {
        let mut server = mockito::Server::new_async().await;
        let mut answer = Timestamp::new(vec![0; 32]);
        answer.add_attestation(Attestation::Pending { uri: server.url() });
        let mock = server
            .mock("POST", "/digest")
            .with_body(answer.to_bytes().unwrap())
            .create_async()
            .await;
        let pool = CalendarPool::new(
            vec![Url::parse(&server.url()).unwrap()],
            1,
            StdDuration::from_secs(5),
        )
        .unwrap();

        let public = tempfile::tempdir().unwrap();
        let checker = ReceiptChecker::new(public.path(), None);
        let entry = ledger_entry("auto-lost", &[0x01; 32]);
        let old = pending_receipt([0x01; 32]).to_bytes().unwrap();
        write_receipt(public.path(), &entry, &old);
        let path = checker.resolve(&entry.receipt_url);
        let mut ledger = Ledger { entries: vec![entry], ..Default::default() };

        let report = restamp_lost(&mut ledger, &checker, &pool, NOW).await;

        mock.assert_async().await;
        assert_eq!(report.lost.len(), 1);
        assert_eq!(report.restamped, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(ledger.entries[0].stamped_at, NOW);
        assert_eq!(ledger.entries[0].status, EntryStatus::Pending);

        let backup = path.with_file_name(format!("{}.ots.lost", hex::encode([0x01; 32])));
        assert_eq!(std::fs::read(backup).unwrap(), old);

        let new = DetachedTimestampFile::from_bytes(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(new.file_digest(), [0x01; 32]);
        let pending = new.timestamp().pending_attestations();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].1, server.url());
    }

    #[tokio::test]
    async fn calendar_failure_leaves_the_entry_alone() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("POST", "/digest").with_status(503).create_async().await;
        let pool = CalendarPool::new(
            vec![Url::parse(&server.url()).unwrap()],
            1,
            StdDuration::from_secs(5),
        )
        .unwrap();

        let public = tempfile::tempdir().unwrap();
        let checker = ReceiptChecker::new(public.path(), None);
        let entry = ledger_entry("auto-lost", &[0x01; 32]);
        let old = pending_receipt([0x01; 32]).to_bytes().unwrap();
        write_receipt(public.path(), &entry, &old);
        let path = checker.resolve(&entry.receipt_url);
        let stamped_at = entry.stamped_at;
        let mut ledger = Ledger { entries: vec![entry], ..Default::default() };

        let report = restamp_lost(&mut ledger, &checker, &pool, NOW).await;

        assert_eq!(report.restamped, 0);
        assert_eq!(report.failed, 1);
        assert!(report.errors[0].starts_with("auto-lost: "));
        assert_eq!(ledger.entries[0].stamped_at, stamped_at);
        assert_eq!(std::fs::read(&path).unwrap(), old);
        assert!(!path.with_extension("ots.lost").exists());
    }
}

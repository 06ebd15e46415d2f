//! Upgrading pending receipts through the calendars.

use ots::calendar::CalendarPool;
use ots::DetachedTimestampFile;
use serde::Serialize;

use crate::common::error::Error;
use crate::common::write_atomic;
use crate::ledger::maintenance::update_status;
use crate::ledger::maintenance::ReceiptChecker;
use crate::ledger::maintenance::StatusReport;
use crate::ledger::EntryStatus;
use crate::ledger::Ledger;
use crate::ledger::LedgerEntry;

/// The outcome of an upgrade run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeReport {
    /// Pending entries looked at
    pub checked: usize,
    /// Receipts rewritten with new attestations
    pub upgraded: usize,
    /// Commitments the calendars have not anchored yet
    pub still_pending: usize,
    /// Per-entry failures, as `<id>: <reason>`
    pub errors: Vec<String>,
}

/// Ask the calendars about every pending entry and rewrite the receipts
/// that gained attestations. The ledger itself is not changed; run
/// [`update_status`] afterwards to confirm the entries.
#[tracing::instrument(skip_all)]
pub async fn upgrade_pending(
    ledger: &Ledger,
    checker: &ReceiptChecker,
    pool: &CalendarPool,
) -> UpgradeReport {
    let mut report = UpgradeReport::default();

    for entry in ledger.entries.iter().filter(|e| e.status == EntryStatus::Pending) {
        report.checked += 1;
        match upgrade_entry(entry, checker, pool).await {
            Ok(outcome) => {
                report.still_pending += outcome.still_pending;
                if outcome.changed {
                    report.upgraded += 1;
                }
                for (calendar, reason) in outcome.failures {
                    report.errors.push(format!("{}: {calendar}: {reason}", entry.id));
                }
            }
            Err(error) => {
                tracing::warn!(id = %entry.id, %error, "could not upgrade receipt");
                report.errors.push(format!("{}: {error}", entry.id));
            }
        }
    }

    report
}

async fn upgrade_entry(
    entry: &LedgerEntry,
    checker: &ReceiptChecker,
    pool: &CalendarPool,
) -> Result<ots::calendar::UpgradeOutcome, Error> {
    let bytes = checker.read_receipt(entry).await?;
    let mut file = DetachedTimestampFile::from_bytes(&bytes).map_err(Error::Receipt)?;

    let outcome = pool.upgrade_timestamp(file.timestamp_mut()).await;
    if outcome.changed {
        let upgraded = file.to_bytes().map_err(Error::Receipt)?;
        write_atomic(&checker.resolve(&entry.receipt_url), &upgraded).await?;
        tracing::info!(id = %entry.id, old_size = bytes.len(), new_size = upgraded.len(), "receipt upgraded");
    }
    Ok(outcome)
}

/// Upgrade the pending receipts, then confirm the entries they now prove.
/// Upgrade failures are reported with the status errors.
pub async fn upgrade_and_update(
    ledger: &mut Ledger,
    checker: &ReceiptChecker,
    pool: &CalendarPool,
) -> (UpgradeReport, StatusReport) {
    let upgrade = upgrade_pending(ledger, checker, pool).await;
    let status = update_status(ledger, checker).await;
    (upgrade, status)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ots::testing::bitcoin_upgrade;
    use ots::testing::pending_commitment;
    use ots::testing::pending_receipt_at;
    use url::Url;

    use super::*;
    use crate::testing::ledger_entry;
    use crate::testing::write_receipt;

    #[tokio::test]
    async fn upgraded_receipts_are_rewritten_and_confirmed() {
        let digest = [0x42; 32];
        let commitment = pending_commitment(digest);
        let upgrade = bitcoin_upgrade(&commitment, 840_000).to_bytes().unwrap();

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", format!("/timestamp/{}", hex::encode(&commitment)).as_str())
            .with_body(upgrade)
            .create_async()
            .await;

        let calendar = Url::parse(&server.url()).unwrap();
        let receipt = pending_receipt_at(digest, calendar.as_str()).to_bytes().unwrap();

        let public = tempfile::tempdir().unwrap();
        let entry = ledger_entry("auto-1", &digest);
        write_receipt(public.path(), &entry, &receipt);

        let checker = ReceiptChecker::new(public.path(), None);
        let pool = CalendarPool::new(vec![calendar], 1, Duration::from_secs(5)).unwrap();
        let mut ledger = Ledger { entries: vec![entry], ..Default::default() };

        let (upgrade, status) = upgrade_and_update(&mut ledger, &checker, &pool).await;

        mock.assert_async().await;
        assert_eq!(upgrade.checked, 1);
        assert_eq!(upgrade.upgraded, 1);
        assert!(upgrade.errors.is_empty());
        assert_eq!(status.updated, 1);
        assert_eq!(ledger.entries[0].status, EntryStatus::Confirmed);
        assert_eq!(ledger.entries[0].block_height, Some(840_000));

        let rewritten = std::fs::read(checker.resolve(&ledger.entries[0].receipt_url)).unwrap();
        assert!(rewritten.len() > receipt.len());
    }

    #[tokio::test]
    async fn pending_answers_leave_receipts_untouched() {
        let digest = [0x42; 32];
        let commitment = pending_commitment(digest);

        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", format!("/timestamp/{}", hex::encode(&commitment)).as_str())
            .with_status(404)
            .create_async()
            .await;

        let calendar = Url::parse(&server.url()).unwrap();
        let receipt = pending_receipt_at(digest, calendar.as_str()).to_bytes().unwrap();

        let public = tempfile::tempdir().unwrap();
        let entry = ledger_entry("auto-1", &digest);
        write_receipt(public.path(), &entry, &receipt);

        let checker = ReceiptChecker::new(public.path(), None);
        let pool = CalendarPool::new(vec![calendar], 1, Duration::from_secs(5)).unwrap();
        let ledger = Ledger { entries: vec![entry], ..Default::default() };

        let report = upgrade_pending(&ledger, &checker, &pool).await;

        assert_eq!(
            report,
            UpgradeReport { checked: 1, upgraded: 0, still_pending: 1, errors: Vec::new() }
        );
        let stored = std::fs::read(checker.resolve(&ledger.entries[0].receipt_url)).unwrap();
        assert_eq!(stored, receipt);
    }

    #[tokio::test]
    async fn unreadable_receipts_are_reported() {
        let public = tempfile::tempdir().unwrap();
        let entry = ledger_entry("auto-1", &[0x42; 32]);
        write_receipt(public.path(), &entry, b"not a receipt");

        let checker = ReceiptChecker::new(public.path(), None);
        let calendar = Url::parse("http://127.0.0.1:9").unwrap();
        let pool = CalendarPool::new(vec![calendar], 1, Duration::from_secs(1)).unwrap();
        let ledger = Ledger { entries: vec![entry], ..Default::default() };

        let report = upgrade_pending(&ledger, &checker, &pool).await;

        assert_eq!(report.checked, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("auto-1: "));
    }
}

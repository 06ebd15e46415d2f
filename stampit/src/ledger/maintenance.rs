//! Ledger housekeeping: dropping entries whose receipts are gone or are
//! backup copies, and confirming entries whose receipts carry a Bitcoin
//! attestation.

use std::collections::HashSet;
use std::io;
use std::path::PathBuf;

use ots::oracle::HeaderOracle;
use ots::verify::Verification;
use ots::VerificationStatus;
use serde::Serialize;
use time::OffsetDateTime;

use crate::common::error::Error;
use crate::ledger::Confirmation;
use crate::ledger::EntryStatus;
use crate::ledger::Ledger;
use crate::ledger::LedgerEntry;

/// Whether the file name of `receipt_url` looks like a primary receipt:
/// it ends in `.ots`, has a single `ots` component and is not a backup.
pub fn is_legitimate_receipt_path(receipt_url: &str) -> bool {
    let filename = receipt_url.rsplit('/').next().unwrap_or(receipt_url);
    if !filename.ends_with(".ots") {
        return false;
    }
    if filename.split('.').filter(|part| *part == "ots").count() > 1 {
        return false;
    }
    !filename.contains(".bak") && !filename.contains(".lost")
}

/// Whether `receipt_url` points into a chain of backup copies.
pub fn is_nested_backup(receipt_url: &str) -> bool {
    receipt_url.contains(".ots.bak")
        || receipt_url.contains(".ots.ots")
        || receipt_url.ends_with(".bak.ots")
}

/// Reads receipts referenced by ledger entries and decides whether they
/// are anchored.
#[derive(Debug, Clone)]
pub struct ReceiptChecker {
    public_dir: PathBuf,
    oracle: Option<HeaderOracle>,
}

impl ReceiptChecker {
    /// Resolve receipts under `public_dir`. Without an oracle, block times
    /// stay unknown and attestations are not checked against headers.
    pub fn new(public_dir: impl Into<PathBuf>, oracle: Option<HeaderOracle>) -> Self {
        Self { public_dir: public_dir.into(), oracle }
    }

    /// Where the receipt of an entry lives on disk.
    pub fn resolve(&self, receipt_url: &str) -> PathBuf {
        self.public_dir.join(receipt_url.trim_start_matches('/'))
    }

    /// Whether the receipt of `entry` exists.
    pub async fn receipt_exists(&self, entry: &LedgerEntry) -> bool {
        tokio::fs::try_exists(self.resolve(&entry.receipt_url))
            .await
            .unwrap_or(false)
    }

    /// Read the receipt of `entry`.
    pub async fn read_receipt(&self, entry: &LedgerEntry) -> Result<Vec<u8>, Error> {
        let path = self.resolve(&entry.receipt_url);
        tokio::fs::read(&path)
            .await
            .map_err(|err| Error::Io(err, path.display().to_string()))
    }

    /// Verify `receipt` against `digest`, consulting the oracle if there is
    /// one.
    pub async fn verify(&self, receipt: &[u8], digest: &[u8; 32]) -> Verification {
        match &self.oracle {
            Some(oracle) => ots::verify_with_oracle(receipt, digest, oracle).await,
            None => ots::verify_receipt(receipt, digest),
        }
    }

    /// The confirmation proven by the receipt of `entry`, if it is
    /// anchored. Receipts that do not verify are an error.
    pub async fn confirmation(&self, entry: &LedgerEntry) -> Result<Option<Confirmation>, Error> {
        let digest = entry.digest()?;
        let receipt = self.read_receipt(entry).await?;
        let verification = self.verify(&receipt, &digest).await;

        match &verification.status {
            VerificationStatus::Pending { .. } => Ok(None),
            VerificationStatus::Complete { .. } => confirmation_from(&entry.id, &verification).map(Some),
            status => Err(Error::UnusableReceipt(entry.id.clone(), status.describe())),
        }
    }
}

fn confirmation_from(id: &str, verification: &Verification) -> Result<Confirmation, Error> {
    let Some(block_height) = verification.block_height() else {
        let reason = "complete receipt without a usable attestation".to_string();
        return Err(Error::UnusableReceipt(id.to_string(), reason));
    };
    let block_time = verification
        .block_time()
        .map(|time| {
            OffsetDateTime::from_unix_timestamp(i64::from(time))
                .map_err(|_| Error::InvalidBlockTime(time))
        })
        .transpose()?;

    Ok(Confirmation {
        block_height,
        txid: verification.txid().map(|txid| txid.to_string()),
        block_time,
    })
}

/// What [`validate`] removed and changed.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// Entries before validation
    pub total: usize,
    /// Entries kept
    pub legitimate: usize,
    /// Dropped for backup or nested receipt paths
    pub backup: usize,
    /// Dropped because the receipt file is missing
    pub missing: usize,
    /// Dropped because an earlier entry has the same hash
    pub duplicates: usize,
    /// Dropped because the hash is not 64 hex characters
    pub invalid_hash: usize,
    /// Entries newly confirmed
    pub status_updated: usize,
}

/// Keep only entries with a well-formed hash, an existing primary receipt
/// and a hash not seen before, then confirm the entries whose receipts are
/// anchored.
#[tracing::instrument(skip_all)]
pub async fn validate(ledger: &mut Ledger, checker: &ReceiptChecker) -> ValidationReport {
    let mut report = ValidationReport { total: ledger.entries.len(), ..Default::default() };
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(ledger.entries.len());

    for mut entry in std::mem::take(&mut ledger.entries) {
        let sha256 = entry.sha256.to_ascii_lowercase();
        if entry.digest().is_err() {
            tracing::warn!(id = %entry.id, sha256 = %entry.sha256, "dropping entry with a malformed hash");
            report.invalid_hash += 1;
            continue;
        }
        if seen.contains(&sha256) {
            tracing::info!(id = %entry.id, "dropping duplicate entry");
            report.duplicates += 1;
            continue;
        }
        if !checker.receipt_exists(&entry).await {
            tracing::info!(id = %entry.id, receipt = %entry.receipt_url, "dropping entry with a missing receipt");
            report.missing += 1;
            continue;
        }
        if !is_legitimate_receipt_path(&entry.receipt_url) {
            tracing::info!(id = %entry.id, receipt = %entry.receipt_url, "dropping backup receipt entry");
            report.backup += 1;
            continue;
        }

        if entry.status == EntryStatus::Pending {
            match checker.confirmation(&entry).await {
                Ok(Some(confirmation)) => {
                    if entry.confirm(confirmation) {
                        tracing::info!(id = %entry.id, "entry confirmed");
                        report.status_updated += 1;
                    }
                }
                Ok(None) => {}
                Err(error) => tracing::warn!(id = %entry.id, %error, "could not check receipt"),
            }
        }

        entry.sha256 = sha256.clone();
        seen.insert(sha256);
        kept.push(entry);
    }

    report.legitimate = kept.len();
    ledger.entries = kept;
    report
}

/// Remove automatic entries whose receipts are nested backup copies.
/// Returns the ids of the removed entries.
pub fn cleanup(ledger: &mut Ledger) -> Vec<String> {
    let mut removed = Vec::new();
    ledger.entries.retain(|entry| {
        let drop = entry.is_automatic() && is_nested_backup(&entry.receipt_url);
        if drop {
            tracing::info!(id = %entry.id, receipt = %entry.receipt_url, "removing nested backup");
            removed.push(entry.id.clone());
        }
        !drop
    });
    removed
}

/// Nested backup receipt files found on disk.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupFilesReport {
    /// Files found, deleted unless this was a dry run
    pub files: Vec<String>,
    /// Files that could not be deleted, as `<path>: <reason>`
    pub errors: Vec<String>,
}

impl ReceiptChecker {
    /// Every file below the public directory whose name is a nested backup
    /// of a receipt, sorted by path. A missing public directory has none.
    pub async fn backup_files(&self) -> Result<Vec<PathBuf>, Error> {
        let mut found = Vec::new();
        let mut dirs = vec![self.public_dir.clone()];

        while let Some(dir) = dirs.pop() {
            let io_err = |err: io::Error| Error::Io(err, dir.display().to_string());
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(io_err(err)),
            };
            while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
                let path = entry.path();
                if entry.file_type().await.map_err(io_err)?.is_dir() {
                    dirs.push(path);
                } else if is_nested_backup(&entry.file_name().to_string_lossy()) {
                    found.push(path);
                }
            }
        }

        found.sort();
        Ok(found)
    }
}

/// Delete the nested backup receipt files under the public directory.
/// With `dry_run` the files are only listed.
#[tracing::instrument(skip(checker))]
pub async fn delete_backup_files(
    checker: &ReceiptChecker,
    dry_run: bool,
) -> Result<BackupFilesReport, Error> {
    let mut report = BackupFilesReport::default();

    for path in checker.backup_files().await? {
        let shown = path.display().to_string();
        if !dry_run {
            if let Err(error) = tokio::fs::remove_file(&path).await {
                tracing::warn!(path = %shown, %error, "could not delete backup file");
                report.errors.push(format!("{shown}: {error}"));
                continue;
            }
            tracing::info!(path = %shown, "deleted backup file");
        }
        report.files.push(shown);
    }

    Ok(report)
}

/// Remove entries whose receipt file does not exist. Returns the ids of
/// the removed entries.
pub async fn remove_orphaned(ledger: &mut Ledger, checker: &ReceiptChecker) -> Vec<String> {
    let mut removed = Vec::new();
    let mut kept = Vec::with_capacity(ledger.entries.len());

    for entry in std::mem::take(&mut ledger.entries) {
        if checker.receipt_exists(&entry).await {
            kept.push(entry);
        } else {
            tracing::info!(id = %entry.id, receipt = %entry.receipt_url, "removing orphaned entry");
            removed.push(entry.id);
        }
    }

    ledger.entries = kept;
    removed
}

/// The outcome of a status update.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Pending entries looked at
    pub checked: usize,
    /// Entries newly confirmed
    pub updated: usize,
    /// Per-entry failures, as `<id>: <reason>`
    pub errors: Vec<String>,
}

/// Confirm every pending entry whose receipt carries a Bitcoin
/// attestation. Failures are recorded per entry and do not stop the run.
#[tracing::instrument(skip_all)]
pub async fn update_status(ledger: &mut Ledger, checker: &ReceiptChecker) -> StatusReport {
    let mut report = StatusReport::default();

    for entry in ledger.entries.iter_mut() {
        if entry.status != EntryStatus::Pending {
            continue;
        }
        report.checked += 1;

        match checker.confirmation(entry).await {
            Ok(Some(confirmation)) => {
                tracing::info!(
                    id = %entry.id,
                    height = confirmation.block_height,
                    txid = ?confirmation.txid,
                    "bitcoin confirmation found"
                );
                if entry.confirm(confirmation) {
                    report.updated += 1;
                }
            }
            Ok(None) => tracing::debug!(id = %entry.id, "still pending"),
            Err(error) => {
                tracing::warn!(id = %entry.id, %error, "could not check receipt");
                report.errors.push(format!("{}: {error}", entry.id));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ots::oracle::EsploraClient;
    use ots::testing::confirmed_receipt;
    use ots::testing::header_committing_to;
    use ots::testing::pending_receipt;
    use test_case::test_case;
    use url::Url;

    use super::*;
    use crate::testing::ledger_entry;
    use crate::testing::write_receipt;

    #[test_case("/receipts/abc.ots" => true; "primary receipt")]
    #[test_case("abc.ots" => true; "bare file name")]
    #[test_case("/receipts/abc.txt" => false; "wrong extension")]
    #[test_case("/receipts/abc.ots.ots" => false; "nested ots")]
    #[test_case("/receipts/abc.bak.ots" => false; "backup")]
    #[test_case("/receipts/abc.lost.ots" => false; "lost copy")]
    #[test_case("/ots/abc.ots" => true; "ots directory")]
    fn legitimate_receipt_paths(url: &str) -> bool {
        is_legitimate_receipt_path(url)
    }

    #[test_case("/receipts/abc.ots.bak" => true; "bak suffix")]
    #[test_case("/receipts/abc.ots.bak.ots" => true; "bak chain")]
    #[test_case("/receipts/abc.ots.ots" => true; "double ots")]
    #[test_case("/receipts/abc.bak.ots" => true; "first level backup")]
    #[test_case("/receipts/abc.ots" => false; "primary")]
    fn nested_backups(url: &str) -> bool {
        is_nested_backup(url)
    }

    #[test]
    fn cleanup_only_touches_automatic_entries() {
        let mut nested_auto = ledger_entry("auto-1", &[1; 32]);
        nested_auto.receipt_url = "/receipts/a.ots.bak.ots".to_string();
        let mut nested_manual = ledger_entry("manual-1", &[2; 32]);
        nested_manual.receipt_url = "/receipts/b.ots.ots".to_string();
        let primary_auto = ledger_entry("auto-2", &[3; 32]);

        let mut ledger = Ledger {
            entries: vec![nested_auto, nested_manual, primary_auto],
            ..Default::default()
        };

        assert_eq!(cleanup(&mut ledger), vec!["auto-1".to_string()]);
        let ids: Vec<&str> = ledger.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["manual-1", "auto-2"]);
    }

    fn touch(path: &std::path::Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"receipt").unwrap();
    }

    #[tokio::test]
    async fn nested_backup_files_are_deleted_from_disk() {
        let public = tempfile::tempdir().unwrap();
        let keep = [
            public.path().join("receipts/a.ots"),
            public.path().join("receipts/a.ots.lost"),
            public.path().join("artifacts/doc.txt"),
        ];
        let delete = [
            public.path().join("artifacts/deep/b.ots.ots"),
            public.path().join("receipts/a.ots.bak"),
            public.path().join("receipts/c.bak.ots"),
        ];
        keep.iter().chain(delete.iter()).for_each(|path| touch(path));
        let checker = ReceiptChecker::new(public.path(), None);

        let listed = delete_backup_files(&checker, true).await.unwrap();
        assert_eq!(listed.files.len(), 3);
        assert!(delete.iter().all(|path| path.exists()));

        let report = delete_backup_files(&checker, false).await.unwrap();
        let mut expected: Vec<String> = delete.iter().map(|p| p.display().to_string()).collect();
        expected.sort();
        assert_eq!(report.files, expected);
        assert!(report.errors.is_empty());
        assert!(delete.iter().all(|path| !path.exists()));
        assert!(keep.iter().all(|path| path.exists()));
    }

    #[tokio::test]
    async fn missing_public_directory_has_no_backup_files() {
        let public = tempfile::tempdir().unwrap();
        let checker = ReceiptChecker::new(public.path().join("absent"), None);

        assert!(checker.backup_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn orphaned_entries_are_removed() {
        let public = tempfile::tempdir().unwrap();
        let present = ledger_entry("present", &[1; 32]);
        write_receipt(public.path(), &present, b"receipt");
        let missing = ledger_entry("missing", &[2; 32]);

        let mut ledger = Ledger { entries: vec![present, missing], ..Default::default() };
        let checker = ReceiptChecker::new(public.path(), None);

        assert_eq!(remove_orphaned(&mut ledger, &checker).await, vec!["missing".to_string()]);
        assert_eq!(ledger.entries.len(), 1);
        assert_eq!(ledger.entries[0].id, "present");
    }

    #[tokio::test]
    async fn validate_drops_bad_entries_and_confirms_anchored_ones() {
        let public = tempfile::tempdir().unwrap();
        let digest = [0x42; 32];
        let anchored = ledger_entry("auto-anchored", &digest);
        write_receipt(public.path(), &anchored, &confirmed_receipt(digest, 840_000).to_bytes().unwrap());

        let mut duplicate = ledger_entry("auto-duplicate", &digest);
        duplicate.sha256 = duplicate.sha256.to_uppercase();

        let mut backup = ledger_entry("auto-backup", &[0x43; 32]);
        backup.receipt_url = "/receipts/backup.bak.ots".to_string();
        write_receipt(public.path(), &backup, b"receipt");

        let missing = ledger_entry("auto-missing", &[0x44; 32]);

        let mut malformed = ledger_entry("auto-malformed", &[0x45; 32]);
        malformed.sha256 = "not-a-hash".to_string();

        let pending_digest = [0x46; 32];
        let mut pending = ledger_entry("auto-pending", &pending_digest);
        pending.sha256 = pending.sha256.to_uppercase();
        write_receipt(public.path(), &pending, &pending_receipt(pending_digest).to_bytes().unwrap());

        let mut ledger = Ledger {
            entries: vec![anchored, duplicate, backup, missing, malformed, pending],
            ..Default::default()
        };
        let checker = ReceiptChecker::new(public.path(), None);
        let report = validate(&mut ledger, &checker).await;

        assert_eq!(
            report,
            ValidationReport {
                total: 6,
                legitimate: 2,
                backup: 1,
                missing: 1,
                duplicates: 1,
                invalid_hash: 1,
                status_updated: 1,
            }
        );
        assert_eq!(ledger.entries[0].status, EntryStatus::Confirmed);
        assert_eq!(ledger.entries[0].block_height, Some(840_000));
        assert_eq!(ledger.entries[1].status, EntryStatus::Pending);
        assert_eq!(ledger.entries[1].sha256, hex::encode(pending_digest));
    }

    #[tokio::test]
    async fn update_status_confirms_without_an_oracle() {
        let public = tempfile::tempdir().unwrap();
        let digest = [0x42; 32];
        let anchored = ledger_entry("anchored", &digest);
        let receipt = confirmed_receipt(digest, 840_000).to_bytes().unwrap();
        write_receipt(public.path(), &anchored, &receipt);

        let pending_digest = [0x43; 32];
        let pending = ledger_entry("pending", &pending_digest);
        write_receipt(public.path(), &pending, &pending_receipt(pending_digest).to_bytes().unwrap());

        // The receipt of another hash does not prove this one.
        let mismatched = ledger_entry("mismatched", &[0x44; 32]);
        write_receipt(public.path(), &mismatched, &receipt);

        let missing = ledger_entry("missing", &[0x45; 32]);

        let mut ledger = Ledger {
            entries: vec![anchored, pending, mismatched, missing],
            ..Default::default()
        };
        let checker = ReceiptChecker::new(public.path(), None);
        let report = update_status(&mut ledger, &checker).await;

        assert_eq!(report.checked, 4);
        assert_eq!(report.updated, 1);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].starts_with("mismatched: "));
        assert!(report.errors[1].starts_with("missing: "));

        let confirmed = &ledger.entries[0];
        let expected_txid = ots::verify_receipt(&receipt, &digest).txid().map(|t| t.to_string());
        assert_eq!(confirmed.status, EntryStatus::Confirmed);
        assert_eq!(confirmed.block_height, Some(840_000));
        assert!(expected_txid.is_some());
        assert_eq!(confirmed.txid, expected_txid);
        assert_eq!(confirmed.block_time, None);
        assert_eq!(ledger.entries[1].status, EntryStatus::Pending);

        // A second run has nothing left to confirm.
        let report = update_status(&mut ledger, &checker).await;
        assert_eq!(report.checked, 3);
        assert_eq!(report.updated, 0);
    }

    #[tokio::test]
    async fn update_status_takes_block_time_from_the_oracle() {
        let public = tempfile::tempdir().unwrap();
        let digest = [0x42; 32];
        let entry = ledger_entry("anchored", &digest);
        let receipt = confirmed_receipt(digest, 840_000).to_bytes().unwrap();
        write_receipt(public.path(), &entry, &receipt);

        let anchor = ots::verify_receipt(&receipt, &digest).anchors[0].anchor.clone();
        let header = header_committing_to(&anchor.merkle_root, 1_713_571_767);
        let hash = header.block_hash();

        let mut server = mockito::Server::new_async().await;
        let _height = server
            .mock("GET", "/block-height/840000")
            .with_body(hash.to_string())
            .create_async()
            .await;
        let _header = server
            .mock("GET", format!("/block/{hash}/header").as_str())
            .with_body(hex::encode(bitcoin::consensus::serialize(&header)))
            .create_async()
            .await;

        let base = Url::parse(&server.url()).unwrap();
        let esplora = EsploraClient::new(base, Duration::from_secs(5)).unwrap();
        let checker = ReceiptChecker::new(public.path(), Some(HeaderOracle::Esplora(esplora)));

        let mut ledger = Ledger { entries: vec![entry], ..Default::default() };
        let report = update_status(&mut ledger, &checker).await;

        assert_eq!(report.updated, 1);
        assert_eq!(
            ledger.entries[0].block_time,
            Some(OffsetDateTime::from_unix_timestamp(1_713_571_767).unwrap())
        );
    }

    #[tokio::test]
    async fn update_status_survives_an_unreachable_oracle() {
        let public = tempfile::tempdir().unwrap();
        let digest = [0x42; 32];
        let entry = ledger_entry("anchored", &digest);
        write_receipt(public.path(), &entry, &confirmed_receipt(digest, 840_000).to_bytes().unwrap());

        let mut server = mockito::Server::new_async().await;
        let _down = server
            .mock("GET", "/block-height/840000")
            .with_status(503)
            .create_async()
            .await;

        let base = Url::parse(&server.url()).unwrap();
        let esplora = EsploraClient::new(base, Duration::from_secs(5)).unwrap();
        let checker = ReceiptChecker::new(public.path(), Some(HeaderOracle::Esplora(esplora)));

        let mut ledger = Ledger { entries: vec![entry], ..Default::default() };
        let report = update_status(&mut ledger, &checker).await;

        assert_eq!(report.updated, 1);
        assert!(report.errors.is_empty());
        assert_eq!(ledger.entries[0].block_height, Some(840_000));
        assert_eq!(ledger.entries[0].block_time, None);
    }
}

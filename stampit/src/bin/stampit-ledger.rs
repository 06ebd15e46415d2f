//! Ledger maintenance tool.

use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use serde::Serialize;
use stampit::config::Settings;
use stampit::context::calendar_pool;
use stampit::context::header_oracle;
use stampit::ledger::maintenance;
use stampit::ledger::maintenance::ReceiptChecker;
use stampit::ledger::restamp;
use stampit::ledger::updater;
use stampit::ledger::Ledger;
use stampit::logging::setup_logging;
use stampit::logging::LogFormat;
use time::OffsetDateTime;

#[derive(Debug, Parser)]
#[clap(name = "stampit-ledger")]
struct CliArgs {
    /// Optional path to the configuration file.
    #[clap(short = 'c', long, required = false)]
    config: Option<PathBuf>,

    #[clap(short = 'o', long = "output-format", default_value = "pretty")]
    output_format: LogFormat,

    /// Report what would change without writing the ledger.
    #[clap(long)]
    dry_run: bool,

    #[clap(subcommand)]
    command: LedgerCommand,
}

#[derive(Debug, Subcommand)]
enum LedgerCommand {
    /// Drop backup, missing and duplicate entries and refresh statuses
    Validate,
    /// Remove automatic entries pointing at nested backup receipts
    Cleanup {
        /// Also delete nested backup receipt files under the public directory.
        #[clap(long)]
        delete_files: bool,
    },
    /// Remove entries whose receipt file is gone
    RemoveOrphaned,
    /// Confirm pending entries whose receipts carry a Bitcoin attestation
    UpdateStatus,
    /// Ask the calendars for upgraded receipts, then update statuses
    Upgrade,
    /// Stamp again the pending entries whose receipts the calendars lost
    Restamp,
    /// Print the ledger totals
    Summary,
}

/// Removed entry ids.
#[derive(Serialize)]
struct Removed {
    removed: Vec<String>,
}

/// Removed entry ids and backup files.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CleanupSummary {
    removed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    backup_files: Option<maintenance::BackupFilesReport>,
}

/// Combined upgrade and status reports.
#[derive(Serialize)]
struct UpgradeSummary {
    upgrade: updater::UpgradeReport,
    status: maintenance::StatusReport,
}

fn print_report<T: Serialize>(report: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    setup_logging("info,stampit=debug", args.output_format);

    let settings = Settings::new(args.config)?;
    let path = settings.ledger.path.clone();
    let checker = ReceiptChecker::new(
        settings.ledger.public_dir.clone(),
        header_oracle(&settings.bitcoin)?,
    );

    let mut ledger = Ledger::load(&path).await?;
    let before = ledger.entries.len();

    match args.command {
        LedgerCommand::Validate => {
            let report = maintenance::validate(&mut ledger, &checker).await;
            print_report(&report)?;
        }
        LedgerCommand::Cleanup { delete_files } => {
            let removed = maintenance::cleanup(&mut ledger);
            let backup_files = if delete_files {
                Some(maintenance::delete_backup_files(&checker, args.dry_run).await?)
            } else {
                None
            };
            print_report(&CleanupSummary { removed, backup_files })?;
        }
        LedgerCommand::RemoveOrphaned => {
            let removed = maintenance::remove_orphaned(&mut ledger, &checker).await;
            print_report(&Removed { removed })?;
        }
        LedgerCommand::UpdateStatus => {
            let report = maintenance::update_status(&mut ledger, &checker).await;
            print_report(&report)?;
        }
        LedgerCommand::Upgrade => {
            let pool = calendar_pool(&settings.stamp)?;
            let (upgrade, status) = updater::upgrade_and_update(&mut ledger, &checker, &pool).await;
            print_report(&UpgradeSummary { upgrade, status })?;
        }
        LedgerCommand::Restamp if args.dry_run => {
            let lost = restamp::find_lost(&ledger, &checker, OffsetDateTime::now_utc()).await;
            print_report(&lost)?;
        }
        LedgerCommand::Restamp => {
            let pool = calendar_pool(&settings.stamp)?;
            let report =
                restamp::restamp_lost(&mut ledger, &checker, &pool, OffsetDateTime::now_utc()).await;
            print_report(&report)?;
        }
        LedgerCommand::Summary => {
            ledger.refresh_metadata(OffsetDateTime::now_utc());
            print_report(&ledger.metadata)?;
            return Ok(());
        }
    }

    if args.dry_run {
        tracing::info!(before, after = ledger.entries.len(), "dry run, ledger not written");
        return Ok(());
    }
    ledger.save(&path).await?;
    Ok(())
}

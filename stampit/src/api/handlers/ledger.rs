//! Handlers for the ledger endpoints.

use tracing::instrument;
use warp::http::StatusCode;
use warp::reply::json;
use warp::reply::with_status;
use warp::reply::Reply;

use crate::api::handlers::now_rfc3339;
use crate::api::models::ledger::LedgerUpdateResponse;
use crate::api::models::ledger::LedgerVerifyRequestBody;
use crate::api::models::ledger::LedgerVerifyResponse;
use crate::common::error::Error;
use crate::common::parse_sha256_hex;
use crate::context::ApiContext;
use crate::ledger::maintenance::update_status;
use crate::ledger::Ledger;

/// Statuses a verifier may report.
const VERIFY_STATUSES: [&str; 3] = ["pending", "confirmed", "invalid"];

/// Update ledger handler: confirms the pending entries whose receipts
/// carry a Bitcoin attestation.
#[instrument(skip(context))]
pub async fn update_ledger(context: ApiContext) -> impl Reply {
    async fn handler(context: ApiContext) -> Result<impl Reply, Error> {
        let path = context.settings.ledger.path.clone();
        let checker = context.receipt_checker();

        let _guard = context.ledger_lock.lock().await;
        let mut ledger = Ledger::load(&path).await?;
        let report = update_status(&mut ledger, &checker).await;
        ledger.save(&path).await?;

        let response = LedgerUpdateResponse {
            success: true,
            checked: report.checked,
            updated: report.updated,
            errors: report.errors,
            timestamp: now_rfc3339()?,
        };
        Ok(with_status(json(&response), StatusCode::OK))
    }

    handler(context)
        .await
        .map_or_else(Reply::into_response, Reply::into_response)
}

/// Track verification handler: records that a client verified a receipt.
#[instrument(skip_all)]
pub async fn track_verification(body: LedgerVerifyRequestBody) -> impl Reply {
    async fn handler(body: LedgerVerifyRequestBody) -> Result<impl Reply, Error> {
        let missing = || Error::InvalidRequest("missing required fields: hash, status".to_string());
        let hash = body.hash.as_deref().ok_or_else(missing)?;
        let status = body.status.as_deref().ok_or_else(missing)?;

        let digest = parse_sha256_hex(hash)
            .map_err(|_| Error::InvalidRequest(format!("invalid hash: {hash}")))?;
        if !VERIFY_STATUSES.contains(&status) {
            return Err(Error::InvalidRequest(format!("invalid status: {status}")));
        }

        tracing::info!(
            hash = %hex::encode(&digest[..8]),
            entry_id = ?body.entry_id,
            status,
            block_height = ?body.block_height,
            "verification tracked"
        );

        let response = LedgerVerifyResponse {
            success: true,
            tracked: true,
            timestamp: now_rfc3339()?,
        };
        Ok(with_status(json(&response), StatusCode::OK))
    }

    handler(body)
        .await
        .map_or_else(Reply::into_response, Reply::into_response)
}

//! Handlers for the verify endpoint.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ots::VerificationStatus;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::instrument;
use warp::http::StatusCode;
use warp::reply::json;
use warp::reply::with_status;
use warp::reply::Reply;

use crate::api::models::verify::AttestationInfo;
use crate::api::models::verify::VerifyRequestBody;
use crate::api::models::verify::VerifyResponse;
use crate::common::error::Error;
use crate::common::parse_sha256_hex;
use crate::context::ApiContext;

/// Verify receipt handler.
#[instrument(skip(context, body), fields(hash = %body.hash))]
pub async fn verify_receipt(context: ApiContext, body: VerifyRequestBody) -> impl Reply {
    async fn handler(context: ApiContext, body: VerifyRequestBody) -> Result<impl Reply, Error> {
        let digest = parse_sha256_hex(body.hash.trim())?;
        let receipt = STANDARD
            .decode(body.receipt_b64.trim())
            .map_err(Error::InvalidReceiptEncoding)?;

        let verification = context.receipt_checker().verify(&receipt, &digest).await;

        let block_time = verification
            .block_time()
            .map(|time| {
                OffsetDateTime::from_unix_timestamp(i64::from(time))
                    .map_err(|_| Error::InvalidBlockTime(time))
                    .and_then(|time| Ok(time.format(&Rfc3339)?))
            })
            .transpose()?;

        let status = &verification.status;
        tracing::info!(status = status.as_str(), "verified receipt");

        let response = VerifyResponse {
            hash: hex::encode(digest),
            status: status.as_str().to_string(),
            verified: status.is_valid(),
            bitcoin_confirmed: matches!(status, VerificationStatus::Complete { .. }),
            block_height: verification.block_height(),
            block_time,
            txid: verification.txid().map(|txid| txid.to_string()),
            attestations: verification.attestations.iter().map(AttestationInfo::from).collect(),
            message: status.describe(),
        };
        Ok(with_status(json(&response), StatusCode::OK))
    }

    handler(context, body)
        .await
        .map_or_else(Reply::into_response, Reply::into_response)
}

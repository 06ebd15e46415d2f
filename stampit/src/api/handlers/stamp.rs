//! Handlers for the stamp endpoints.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::debug;
use tracing::instrument;
use warp::http::header::CACHE_CONTROL;
use warp::http::header::CONTENT_DISPOSITION;
use warp::http::header::CONTENT_TYPE;
use warp::http::StatusCode;
use warp::reply::json;
use warp::reply::with_header;
use warp::reply::with_status;
use warp::reply::Reply;

use crate::api::models::stamp::StampRequestBody;
use crate::api::models::stamp::StampResponse;
use crate::common::error::Error;
use crate::common::parse_sha256_hex;
use crate::context::ApiContext;
use crate::rate_limit::client_key;
use crate::receipts::ReceiptStore;

/// Submit `digest` to the calendars on behalf of `client` and store the
/// receipt.
async fn stamp_and_store(
    context: &ApiContext,
    digest: [u8; 32],
    client: &str,
) -> Result<Vec<u8>, Error> {
    if !context.rate_limiter.check(client).await {
        return Err(Error::RateLimited(client.to_string()));
    }

    let file = context
        .calendars
        .stamp_digest(digest)
        .await
        .map_err(Error::StampFailed)?;
    let receipt = file.to_bytes().map_err(Error::Receipt)?;
    if receipt.is_empty() {
        return Err(Error::EmptyReceipt);
    }

    context.receipts.save(&digest, &receipt).await?;
    Ok(receipt)
}

/// Create stamp handler.
#[instrument(skip(context, body))]
pub async fn create_stamp(
    context: ApiContext,
    forwarded_for: Option<String>,
    body: StampRequestBody,
) -> impl Reply {
    debug!("In create stamp");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(
        context: ApiContext,
        forwarded_for: Option<String>,
        body: StampRequestBody,
    ) -> Result<impl Reply, Error> {
        let hash = body.hash.unwrap_or_default();
        let digest = parse_sha256_hex(&hash)?;
        let client = client_key(forwarded_for.as_deref());

        let receipt = stamp_and_store(&context, digest, &client).await?;

        let response = StampResponse {
            hash: hex::encode(digest),
            filename: ReceiptStore::filename(&digest),
            size: receipt.len(),
            receipt_b64: STANDARD.encode(&receipt),
        };
        Ok(with_status(json(&response), StatusCode::OK))
    }

    // Handle and respond.
    handler(context, forwarded_for, body)
        .await
        .map_or_else(Reply::into_response, Reply::into_response)
}

/// Download receipt handler. A stored receipt is served as is, otherwise
/// the hash is stamped first.
#[instrument(skip(context))]
pub async fn get_receipt(
    context: ApiContext,
    filename: String,
    forwarded_for: Option<String>,
) -> impl Reply {
    debug!("In get receipt");
    async fn handler(
        context: ApiContext,
        filename: String,
        forwarded_for: Option<String>,
    ) -> Result<impl Reply, Error> {
        let hash = filename.strip_suffix(".ots").ok_or(Error::NotFound)?;
        let digest = parse_sha256_hex(hash)?;

        let receipt = match context.receipts.load(&digest).await? {
            Some(receipt) => receipt,
            None => {
                let client = client_key(forwarded_for.as_deref());
                stamp_and_store(&context, digest, &client).await?
            }
        };

        let disposition = format!("attachment; filename=\"{}\"", ReceiptStore::filename(&digest));
        let reply = with_header(receipt, CONTENT_TYPE, "application/octet-stream");
        let reply = with_header(reply, CONTENT_DISPOSITION, disposition);
        Ok(with_header(reply, CACHE_CONTROL, "no-store"))
    }

    handler(context, filename, forwarded_for)
        .await
        .map_or_else(Reply::into_response, Reply::into_response)
}

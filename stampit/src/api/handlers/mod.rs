//! Handlers for the stampit API

use std::convert::Infallible;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::error;
use warp::http::StatusCode;
use warp::Rejection;
use warp::Reply;

use crate::common::error::Error;
use crate::common::error::ErrorResponse;

/// Health handlers.
pub mod health;
/// Ledger handlers.
pub mod ledger;
/// Stamp handlers.
pub mod stamp;
/// Verify handlers.
pub mod verify;

/// The current time as an RFC 3339 string.
pub(crate) fn now_rfc3339() -> Result<String, Error> {
    Ok(OffsetDateTime::now_utc().format(&Rfc3339)?)
}

fn error_reply(error: &str, message: String, status: StatusCode) -> impl Reply {
    let body = ErrorResponse { error: error.to_string(), message: Some(message) };
    warp::reply::with_status(warp::reply::json(&body), status)
}

/// Central error handler for Warp rejections, converting them to appropriate HTTP responses.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    if err.is_not_found() {
        return Ok(error_reply("not_found", "Not Found".to_string(), StatusCode::NOT_FOUND));
    }

    if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        let message = format!("Invalid Body: {e}");
        return Ok(error_reply("invalid_request", message, StatusCode::BAD_REQUEST));
    }

    if let Some(e) = err.find::<warp::reject::MethodNotAllowed>() {
        let message = format!("Method Not Allowed: {e}");
        return Ok(error_reply("method_not_allowed", message, StatusCode::METHOD_NOT_ALLOWED));
    }

    if let Some(e) = err.find::<warp::filters::cors::CorsForbidden>() {
        return Ok(error_reply("cors_forbidden", e.to_string(), StatusCode::FORBIDDEN));
    }

    if let Some(e) = err.find::<warp::reject::PayloadTooLarge>() {
        let message = e.to_string();
        return Ok(error_reply("payload_too_large", message, StatusCode::PAYLOAD_TOO_LARGE));
    }

    error!("Unhandled error: {:?}", err);
    Ok(error_reply(
        "internal_error",
        "Internal Server Error".to_string(),
        StatusCode::INTERNAL_SERVER_ERROR,
    ))
}

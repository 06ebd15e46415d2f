//! Top-level error type for the stampit service

use serde::Deserialize;
use serde::Serialize;
use warp::http::StatusCode;
use warp::reject::Reject;
use warp::reply::Reply;

/// Errors from the API and the ledger jobs.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The submitted hash is not 64 hex characters.
    #[error("invalid sha256 hash: {0:?}")]
    InvalidHash(String),

    /// The client exceeded one of its request windows.
    #[error("rate limit exceeded for client {0}")]
    RateLimited(String),

    /// The calendars did not produce a usable timestamp.
    #[error("stamping failed: {0}")]
    StampFailed(#[source] ots::Error),

    /// Stamping produced a receipt without content.
    #[error("the calendars returned an empty receipt")]
    EmptyReceipt,

    /// The requested resource does not exist.
    #[error("not found")]
    NotFound,

    /// A calendar or block-header client could not be created.
    #[error("could not set up client: {0}")]
    ClientSetup(#[source] ots::Error),

    /// The request body is missing a field or carries a bad value.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The base64 receipt in a request could not be decoded.
    #[error("invalid base64 receipt: {0}")]
    InvalidReceiptEncoding(#[source] base64::DecodeError),

    /// An OTS receipt could not be parsed or serialized.
    #[error("receipt error: {0}")]
    Receipt(#[source] ots::Error),

    /// A ledger entry's receipt does not prove its hash.
    #[error("receipt of entry {0} is unusable: {1}")]
    UnusableReceipt(String, String),

    /// Reading or writing a file failed.
    #[error("io error on {1}: {0}")]
    Io(#[source] std::io::Error, String),

    /// The ledger file is not valid JSON of the expected shape.
    #[error("could not parse ledger {1}: {0}")]
    LedgerParse(#[source] serde_json::Error, String),

    /// The ledger could not be serialized.
    #[error("could not serialize ledger: {0}")]
    LedgerSerialize(#[source] serde_json::Error),

    /// Formatting a timestamp failed.
    #[error("could not format time: {0}")]
    TimeFormat(#[from] time::error::Format),

    /// Block time out of the representable range.
    #[error("invalid block time {0}")]
    InvalidBlockTime(u32),

    /// A blocking file task panicked or was cancelled.
    #[error("file task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Provides the status code that corresponds to the error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidHash(_) => StatusCode::BAD_REQUEST,
            Error::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::InvalidReceiptEncoding(_) => StatusCode::BAD_REQUEST,
            Error::StampFailed(_)
            | Error::EmptyReceipt
            | Error::Receipt(_)
            | Error::UnusableReceipt(_, _)
            | Error::ClientSetup(_)
            | Error::Io(_, _)
            | Error::LedgerParse(_, _)
            | Error::LedgerSerialize(_)
            | Error::TimeFormat(_)
            | Error::InvalidBlockTime(_)
            | Error::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Provides the machine readable error code that corresponds to the
    /// error.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidHash(_) => "invalid_hash",
            Error::RateLimited(_) => "rate_limited",
            Error::StampFailed(_) => "stamp_failed",
            Error::EmptyReceipt => "empty_receipt",
            Error::NotFound => "not_found",
            Error::InvalidRequest(_) | Error::InvalidReceiptEncoding(_) => "invalid_request",
            _ => "internal_error",
        }
    }

    /// Provides the error message that corresponds to the error, if one is
    /// shown to clients.
    pub fn error_message(&self) -> Option<String> {
        match self {
            Error::InvalidHash(_) | Error::RateLimited(_) | Error::EmptyReceipt | Error::NotFound => {
                None
            }
            Error::StampFailed(err) => Some(err.to_string()),
            Error::InvalidRequest(msg) => Some(msg.clone()),
            Error::InvalidReceiptEncoding(err) => Some(err.to_string()),
            _ => Some("Internal server error".to_string()),
        }
    }
}

/// Structure representing an error response
/// This is used to serialize error messages in HTTP responses
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Machine readable error code
    pub error: String,
    /// Details, when there are any worth showing
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        ErrorResponse {
            error: err.error_code().to_string(),
            message: err.error_message(),
        }
    }
}

/// Implement reject for error.
impl Reject for Error {}

/// Implement reply for internal error representation so that the error can be
/// provided directly from Warp as a reply.
impl Reply for Error {
    fn into_response(self) -> warp::reply::Response {
        warp::reply::with_status(warp::reply::json(&ErrorResponse::from(&self)), self.status_code())
            .into_response()
    }
}

//! Bodies of the stamp endpoints.

use serde::Deserialize;
use serde::Serialize;

/// Request body of `POST /api/stamp`.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampRequestBody {
    /// Hex SHA-256 digest to stamp. Validated by the handler so that a
    /// missing hash is reported like a malformed one.
    #[serde(default)]
    pub hash: Option<String>,
}

/// Response body of `POST /api/stamp`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StampResponse {
    /// Lowercase hex digest
    pub hash: String,
    /// Suggested file name of the receipt
    pub filename: String,
    /// Receipt size in bytes
    pub size: usize,
    /// The receipt, base64 encoded
    #[serde(rename = "receiptB64")]
    pub receipt_b64: String,
}

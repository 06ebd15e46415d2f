//! Bodies of the ledger endpoints.

use serde::Deserialize;
use serde::Serialize;

/// Response body of `/api/ledger/update`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerUpdateResponse {
    /// Always true, failures are reported as errors
    pub success: bool,
    /// Pending entries looked at
    pub checked: usize,
    /// Entries newly confirmed
    pub updated: usize,
    /// Per-entry failures
    pub errors: Vec<String>,
    /// When the update finished, RFC 3339
    pub timestamp: String,
}

/// Request body of `POST /api/ledger/verify`. Fields are optional here
/// so the handler can answer a missing field with a 400.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerVerifyRequestBody {
    /// Hex SHA-256 digest that was verified
    #[serde(default)]
    pub hash: Option<String>,
    /// Ledger entry the verification refers to
    #[serde(default)]
    pub entry_id: Option<String>,
    /// `pending`, `confirmed` or `invalid`
    #[serde(default)]
    pub status: Option<String>,
    /// Block height seen by the verifier
    #[serde(default)]
    pub block_height: Option<u64>,
}

/// Response body of `POST /api/ledger/verify`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerVerifyResponse {
    /// Always true
    pub success: bool,
    /// Whether the event was recorded
    pub tracked: bool,
    /// When the event was recorded, RFC 3339
    pub timestamp: String,
}

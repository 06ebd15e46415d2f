//! Bodies of the verify endpoint.

use ots::attestation::Attestation;
use serde::Deserialize;
use serde::Serialize;

/// Request body of `POST /api/verify`.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyRequestBody {
    /// Hex SHA-256 digest of the file
    pub hash: String,
    /// The receipt, base64 encoded
    #[serde(rename = "receiptB64")]
    pub receipt_b64: String,
}

/// One attestation found in a receipt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationInfo {
    /// `bitcoin`, `litecoin`, `pending` or `unknown`
    #[serde(rename = "type")]
    pub kind: String,
    /// Attested block height
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub block_height: Option<u64>,
    /// Calendar holding a pending commitment
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub calendar: Option<String>,
    /// Whether the attestation is a Bitcoin block attestation
    pub confirmed: bool,
}

impl From<&Attestation> for AttestationInfo {
    fn from(attestation: &Attestation) -> Self {
        let (kind, block_height, calendar) = match attestation {
            Attestation::Bitcoin { height } => ("bitcoin", Some(*height), None),
            Attestation::Litecoin { height } => ("litecoin", Some(*height), None),
            Attestation::Pending { uri } => ("pending", None, Some(uri.clone())),
            Attestation::Unknown { .. } => ("unknown", None, None),
        };
        AttestationInfo {
            kind: kind.to_string(),
            block_height,
            calendar,
            confirmed: matches!(attestation, Attestation::Bitcoin { .. }),
        }
    }
}

/// Response body of `POST /api/verify`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Lowercase hex digest
    pub hash: String,
    /// `invalid`, `mismatch`, `pending` or `complete`
    pub status: String,
    /// Whether the receipt is a valid proof, pending or complete
    pub verified: bool,
    /// Whether the receipt carries a Bitcoin attestation
    pub bitcoin_confirmed: bool,
    /// Lowest attested block height
    pub block_height: Option<u64>,
    /// Block time, RFC 3339, when a header source is configured
    pub block_time: Option<String>,
    /// Anchoring transaction
    pub txid: Option<String>,
    /// The attestations in the receipt
    pub attestations: Vec<AttestationInfo>,
    /// Human readable summary
    pub message: String,
}

//! Responses of the health endpoint.

use serde::Deserialize;
use serde::Serialize;

/// State of the rate limiting backends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthData {
    /// The shared limiter backend. There is none, so always `disabled`.
    pub redis: String,
    /// The in-process limiter
    pub memory_limiter: String,
}

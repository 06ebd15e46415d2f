//! Field deserializers for values the config crate hands over as strings
//! or integers.

use std::time::Duration;

use serde::de::Error as _;
use serde::Deserialize;
use serde::Deserializer;
use url::Url;

/// Parse a list of URLs. An empty list is allowed here and rejected, where
/// it matters, during validation.
pub fn url_deserializer_vec<'de, D>(deserializer: D) -> Result<Vec<Url>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<String>::deserialize(deserializer)?
        .iter()
        .map(|raw| Url::parse(raw.trim()).map_err(D::Error::custom))
        .collect()
}

/// Parse an optional URL. Empty strings count as missing, so that an
/// environment variable can unset a configured URL.
pub fn url_deserializer_option<'de, D>(deserializer: D) -> Result<Option<Url>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => Url::parse(raw.trim()).map(Some).map_err(D::Error::custom),
        _ => Ok(None),
    }
}

/// Read a whole number of seconds into a [`Duration`].
pub fn duration_seconds_deserializer<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

/// Configuration error variants.
#[derive(Debug, thiserror::Error)]
pub enum StampitConfigError {
    /// At least one calendar is needed to stamp anything
    #[error("At least one calendar must be configured")]
    NoCalendars,

    /// The minimum number of calendar responses cannot be met
    #[error("min_calendar_responses must be between 1 and the number of calendars ({1}), got {0}")]
    MinResponsesOutOfRange(usize, usize),

    /// An error returned for duration parameters that must be positive.
    #[error("Duration for {0} must be nonzero")]
    ZeroDurationForbidden(&'static str),

    /// An error returned for limits that must be positive.
    #[error("Limit for {0} must be nonzero")]
    ZeroLimitForbidden(&'static str),

    /// Widget origins must use https
    #[error("Invalid allowed origin: only https is supported; got '{0}'")]
    InsecureOrigin(String),

    /// Widget origins must be a bare scheme and host
    #[error("Invalid allowed origin: paths, queries and credentials are not supported: '{0}'")]
    OriginNotBare(String),

    /// Wildcards are never accepted as an origin
    #[error("Invalid allowed origin: wildcards are not supported")]
    WildcardOrigin,

    /// Only one block header source may be configured
    #[error("Configure either bitcoin.esplora_url or bitcoin.rpc_endpoint, not both")]
    ConflictingHeaderSources,

    /// Invalid origin or endpoint URL
    #[error("Invalid URL: Failed to parse: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

//! Top-level error type for the ots library
//!

use url::Url;

/// Errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input did not start with the detached timestamp header.
    #[error("not an OpenTimestamps proof: bad magic bytes")]
    BadMagic,
    /// The major version of the proof is not one we understand.
    #[error("unsupported proof version {0}")]
    UnsupportedVersion(u64),
    /// The input ended while more bytes were expected.
    #[error("unexpected end of input after {0} bytes")]
    UnexpectedEof(usize),
    /// A varuint did not fit into 64 bits.
    #[error("varuint at offset {0} overflows 64 bits")]
    VaruintOverflow(usize),
    /// A length prefixed field was outside of its allowed range.
    #[error("length {len} outside of allowed range {min}..={max}")]
    LengthOutOfRange {
        /// The length read from the input
        len: u64,
        /// Minimum allowed length
        min: usize,
        /// Maximum allowed length
        max: usize,
    },
    /// The operation tag is not known.
    #[error("unknown operation tag 0x{0:02x}")]
    UnknownOp(u8),
    /// The file hash operation of a detached proof must be a hash.
    #[error("operation {0} cannot hash a file")]
    NotAFileHashOp(crate::op::Op),
    /// The result of an operation is too long.
    #[error("result of {op} would be {len} bytes long")]
    ResultTooLong {
        /// The operation that was applied
        op: crate::op::Op,
        /// Length of the result
        len: usize,
    },
    /// The timestamp tree is nested deeper than allowed.
    #[error("timestamp nesting exceeds {0} levels")]
    RecursionLimit(usize),
    /// Bytes were left over after the end of the proof.
    #[error("{0} trailing bytes after the end of the proof")]
    TrailingBytes(usize),
    /// The attestation payload was not fully consumed.
    #[error("{0} unused bytes in attestation payload")]
    TrailingPayload(usize),
    /// A timestamp with neither attestations nor operations.
    #[error("timestamp for message {0} has no attestations or operations")]
    EmptyTimestamp(String),
    /// The pending attestation URI contains a forbidden character.
    #[error("invalid character {0:?} in pending attestation uri")]
    InvalidPendingUri(char),
    /// Two timestamps for different messages cannot be merged.
    #[error("cannot merge timestamps for different messages: {0} vs {1}")]
    MergeMismatch(String, String),
    /// The digest has the wrong length for the file hash operation.
    #[error("digest of {actual} bytes does not match {op} ({expected} bytes)")]
    DigestLength {
        /// The file hash op
        op: crate::op::Op,
        /// Expected digest length
        expected: usize,
        /// Given digest length
        actual: usize,
    },
    /// Reading from an io source failed.
    #[error("io error: {0}")]
    Io(#[source] std::io::Error),

    /// The HTTP request to a calendar failed.
    #[error("request to calendar {1} failed: {0}")]
    CalendarRequest(#[source] reqwest::Error, Url),
    /// The calendar answered with an unexpected status.
    #[error("calendar {1} responded with status {0}")]
    CalendarStatus(reqwest::StatusCode, Url),
    /// The calendar response is larger than we accept.
    #[error("calendar {1} response of {0} bytes is too large")]
    CalendarResponseTooLarge(usize, Url),
    /// The calendar did not answer in time.
    #[error("calendar {0} timed out")]
    CalendarTimeout(Url),
    /// The calendar returned a timestamp we could not decode.
    #[error("calendar {1} returned a malformed timestamp: {0}")]
    CalendarMalformed(#[source] Box<Error>, Url),
    /// Not enough calendars accepted the digest.
    #[error("only {got} of the required {required} calendars accepted the digest")]
    NotEnoughCalendars {
        /// Successful submissions
        got: usize,
        /// Minimum successful submissions
        required: usize,
    },
    /// The URL could not be joined with the request path.
    #[error("could not build request url from {1}: {0}")]
    InvalidUrl(#[source] url::ParseError, Url),

    /// Bitcoin-core RPC error
    #[error("bitcoin-core RPC error for height {1}: {0}")]
    BitcoinCoreRpc(#[source] bitcoincore_rpc::Error, u64),
    /// Could not build the bitcoin-core client
    #[error("could not create bitcoin-core client for {1}: {0}")]
    BitcoinCoreRpcClient(#[source] bitcoincore_rpc::Error, String),
    /// The endpoint URL needs a port
    #[error("a port is required for the bitcoin-core endpoint {0}")]
    PortRequired(Url),
    /// The request to an Esplora server failed.
    #[error("esplora request to {1} failed: {0}")]
    EsploraRequest(#[source] reqwest::Error, Url),
    /// The Esplora server answered with an unexpected status.
    #[error("esplora {1} responded with status {0}")]
    EsploraStatus(reqwest::StatusCode, Url),
    /// The block header returned by Esplora was not valid hex.
    #[error("could not decode block header hex: {0}")]
    DecodeHeaderHex(#[source] hex::FromHexError),
    /// The block header returned by Esplora could not be deserialized.
    #[error("could not decode block header: {0}")]
    DecodeBlockHeader(#[source] bitcoin::consensus::encode::Error),
    /// The block hash returned by Esplora could not be parsed.
    #[error("could not parse block hash {0:?}")]
    ParseBlockHash(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

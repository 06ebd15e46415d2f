//! Attestations are the leaves of a timestamp tree.

use std::cmp::Ordering;
use std::fmt;

use crate::error::Error;
use crate::ser::Deserializer;
use crate::ser::Serializer;

/// Length of an attestation tag.
pub const TAG_SIZE: usize = 8;

/// Maximum length of an attestation payload.
pub const MAX_PAYLOAD_SIZE: usize = 8192;

/// Maximum length of a pending attestation URI.
pub const MAX_URI_LENGTH: usize = 1000;

/// Tag of a Bitcoin block header attestation.
pub const BITCOIN_TAG: [u8; TAG_SIZE] = [0x05, 0x88, 0x96, 0x0d, 0x73, 0xd7, 0x19, 0x01];

/// Tag of a Litecoin block header attestation.
pub const LITECOIN_TAG: [u8; TAG_SIZE] = [0x06, 0x86, 0x9a, 0x0d, 0x73, 0xd7, 0x1b, 0x45];

/// Tag of a pending attestation.
pub const PENDING_TAG: [u8; TAG_SIZE] = [0x83, 0xdf, 0xe3, 0x0d, 0x2e, 0xf9, 0x0c, 0x8e];

/// A claim that the message it is attached to existed at some point.
///
/// Attestations order by tag bytes first, then by their value, which is
/// the order they are serialized in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Attestation {
    /// The message is the merkle root of the Bitcoin block at this height.
    Bitcoin {
        /// Block height
        height: u64,
    },
    /// The message is the merkle root of the Litecoin block at this height.
    Litecoin {
        /// Block height
        height: u64,
    },
    /// The calendar at `uri` promised to commit the message to a chain.
    Pending {
        /// Calendar URI
        uri: String,
    },
    /// An attestation type we do not understand.
    Unknown {
        /// The attestation tag
        tag: [u8; TAG_SIZE],
        /// The raw payload
        payload: Vec<u8>,
    },
}

impl Attestation {
    /// The tag this attestation is serialized with.
    pub fn tag(&self) -> [u8; TAG_SIZE] {
        match self {
            Attestation::Bitcoin { .. } => BITCOIN_TAG,
            Attestation::Litecoin { .. } => LITECOIN_TAG,
            Attestation::Pending { .. } => PENDING_TAG,
            Attestation::Unknown { tag, .. } => *tag,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Attestation::Bitcoin { .. } => 0,
            Attestation::Litecoin { .. } => 1,
            Attestation::Pending { .. } => 2,
            Attestation::Unknown { .. } => 3,
        }
    }

    /// The Bitcoin block height, if this is a Bitcoin attestation.
    pub fn bitcoin_height(&self) -> Option<u64> {
        match self {
            Attestation::Bitcoin { height } => Some(*height),
            _ => None,
        }
    }

    /// The calendar URI, if this is a pending attestation.
    pub fn pending_uri(&self) -> Option<&str> {
        match self {
            Attestation::Pending { uri } => Some(uri),
            _ => None,
        }
    }

    /// Serialize the attestation, tag and varbytes payload.
    pub fn serialize(&self, ser: &mut Serializer) {
        ser.write_bytes(&self.tag());

        let mut payload = Serializer::new();
        match self {
            Attestation::Bitcoin { height } | Attestation::Litecoin { height } => {
                payload.write_varuint(*height)
            }
            Attestation::Pending { uri } => payload.write_varbytes(uri.as_bytes()),
            Attestation::Unknown { payload: raw, .. } => payload.write_bytes(raw),
        }
        ser.write_varbytes(&payload.into_bytes());
    }

    /// Deserialize an attestation. The payload must be consumed exactly.
    pub fn deserialize(de: &mut Deserializer) -> Result<Self, Error> {
        let tag: [u8; TAG_SIZE] = de.read_array()?;
        let payload = de.read_varbytes(0, MAX_PAYLOAD_SIZE)?;
        let mut payload_de = Deserializer::new(payload);

        let attestation = match tag {
            BITCOIN_TAG => Attestation::Bitcoin { height: payload_de.read_varuint()? },
            LITECOIN_TAG => Attestation::Litecoin { height: payload_de.read_varuint()? },
            PENDING_TAG => {
                let raw = payload_de.read_varbytes(0, MAX_URI_LENGTH)?;
                Attestation::Pending { uri: validate_uri(raw)? }
            }
            tag => {
                return Ok(Attestation::Unknown { tag, payload: payload.to_vec() });
            }
        };

        match payload_de.remaining() {
            0 => Ok(attestation),
            n => Err(Error::TrailingPayload(n)),
        }
    }
}

impl Ord for Attestation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tag().cmp(&other.tag()).then_with(|| match (self, other) {
            (Attestation::Bitcoin { height: a }, Attestation::Bitcoin { height: b })
            | (Attestation::Litecoin { height: a }, Attestation::Litecoin { height: b }) => a.cmp(b),
            (Attestation::Pending { uri: a }, Attestation::Pending { uri: b }) => a.cmp(b),
            (Attestation::Unknown { payload: a, .. }, Attestation::Unknown { payload: b, .. }) => {
                a.cmp(b)
            }
            // Only reachable for an `Unknown` built with a known tag.
            _ => self.rank().cmp(&other.rank()),
        })
    }
}

impl PartialOrd for Attestation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pending URIs are restricted to a conservative character set so that
/// they can be used to build calendar requests safely.
fn validate_uri(raw: &[u8]) -> Result<String, Error> {
    let allowed = |c: u8| c.is_ascii_alphanumeric() || matches!(c, b'-' | b'.' | b'_' | b'/' | b':');
    if let Some(bad) = raw.iter().copied().find(|c| !allowed(*c)) {
        return Err(Error::InvalidPendingUri(bad as char));
    }
    // Every byte is ASCII at this point.
    Ok(raw.iter().map(|c| *c as char).collect())
}

impl fmt::Display for Attestation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attestation::Bitcoin { height } => write!(f, "BitcoinBlockHeaderAttestation({height})"),
            Attestation::Litecoin { height } => write!(f, "LitecoinBlockHeaderAttestation({height})"),
            Attestation::Pending { uri } => write!(f, "PendingAttestation('{uri}')"),
            Attestation::Unknown { tag, payload } => {
                write!(f, "UnknownAttestation({}, {})", hex::encode(tag), hex::encode(payload))
            }
        }
    }
}

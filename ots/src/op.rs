//! Commitment operations
//!
//! Every edge of a timestamp tree is an operation that maps the parent
//! message to the child message. Hash operations commit to the whole
//! message, binary operations mix in a fixed argument.

use std::fmt;

use bitcoin::hashes::ripemd160;
use bitcoin::hashes::sha1;
use bitcoin::hashes::Hash as _;
use sha2::Digest as _;

use crate::error::Error;
use crate::ser::Deserializer;
use crate::ser::Serializer;

/// Maximum length of an operation result, and of a binary op argument.
pub const MAX_RESULT_LENGTH: usize = 4096;

/// Tag of the sha1 operation.
pub const TAG_SHA1: u8 = 0x02;
/// Tag of the ripemd160 operation.
pub const TAG_RIPEMD160: u8 = 0x03;
/// Tag of the sha256 operation.
pub const TAG_SHA256: u8 = 0x08;
/// Tag of the keccak256 operation.
pub const TAG_KECCAK256: u8 = 0x67;
/// Tag of the append operation.
pub const TAG_APPEND: u8 = 0xf0;
/// Tag of the prepend operation.
pub const TAG_PREPEND: u8 = 0xf1;
/// Tag of the reverse operation.
pub const TAG_REVERSE: u8 = 0xf2;
/// Tag of the hexlify operation.
pub const TAG_HEXLIFY: u8 = 0xf3;

/// An operation on a message.
///
/// Variants are declared in tag order, so the derived ordering sorts by
/// tag first and by argument second, which is the order operations are
/// serialized in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Op {
    /// SHA-1 of the message.
    Sha1,
    /// RIPEMD-160 of the message.
    Ripemd160,
    /// SHA-256 of the message.
    Sha256,
    /// Keccak-256 of the message.
    Keccak256,
    /// The message followed by the argument.
    Append(Vec<u8>),
    /// The argument followed by the message.
    Prepend(Vec<u8>),
    /// The message with its bytes reversed.
    Reverse,
    /// The lowercase hex encoding of the message, as ASCII bytes.
    Hexlify,
}

impl Op {
    /// The serialization tag of this operation.
    pub fn tag(&self) -> u8 {
        match self {
            Op::Sha1 => TAG_SHA1,
            Op::Ripemd160 => TAG_RIPEMD160,
            Op::Sha256 => TAG_SHA256,
            Op::Keccak256 => TAG_KECCAK256,
            Op::Append(_) => TAG_APPEND,
            Op::Prepend(_) => TAG_PREPEND,
            Op::Reverse => TAG_REVERSE,
            Op::Hexlify => TAG_HEXLIFY,
        }
    }

    /// The digest length of a hash operation, `None` for other operations.
    pub fn digest_len(&self) -> Option<usize> {
        match self {
            Op::Sha1 | Op::Ripemd160 => Some(20),
            Op::Sha256 | Op::Keccak256 => Some(32),
            _ => None,
        }
    }

    /// Apply the operation to a message.
    pub fn apply(&self, msg: &[u8]) -> Result<Vec<u8>, Error> {
        let result = match self {
            Op::Sha1 => sha1::Hash::hash(msg).to_byte_array().to_vec(),
            Op::Ripemd160 => ripemd160::Hash::hash(msg).to_byte_array().to_vec(),
            Op::Sha256 => sha2::Sha256::digest(msg).to_vec(),
            Op::Keccak256 => sha3::Keccak256::digest(msg).to_vec(),
            Op::Append(arg) => [msg, arg.as_slice()].concat(),
            Op::Prepend(arg) => [arg.as_slice(), msg].concat(),
            Op::Reverse => msg.iter().rev().copied().collect(),
            Op::Hexlify => hex::encode(msg).into_bytes(),
        };

        if result.len() > MAX_RESULT_LENGTH {
            return Err(Error::ResultTooLong { op: self.clone(), len: result.len() });
        }
        Ok(result)
    }

    /// Write the tag and, for binary operations, the argument.
    pub fn serialize(&self, ser: &mut Serializer) {
        ser.write_byte(self.tag());
        if let Op::Append(arg) | Op::Prepend(arg) = self {
            ser.write_varbytes(arg);
        }
    }

    /// Read an operation whose tag has already been consumed.
    pub fn deserialize_with_tag(tag: u8, de: &mut Deserializer) -> Result<Self, Error> {
        let op = match tag {
            TAG_SHA1 => Op::Sha1,
            TAG_RIPEMD160 => Op::Ripemd160,
            TAG_SHA256 => Op::Sha256,
            TAG_KECCAK256 => Op::Keccak256,
            TAG_APPEND => Op::Append(de.read_varbytes(1, MAX_RESULT_LENGTH)?.to_vec()),
            TAG_PREPEND => Op::Prepend(de.read_varbytes(1, MAX_RESULT_LENGTH)?.to_vec()),
            TAG_REVERSE => Op::Reverse,
            TAG_HEXLIFY => Op::Hexlify,
            unknown => return Err(Error::UnknownOp(unknown)),
        };
        Ok(op)
    }

    /// Read an operation, tag included.
    pub fn deserialize(de: &mut Deserializer) -> Result<Self, Error> {
        let tag = de.read_byte()?;
        Self::deserialize_with_tag(tag, de)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Sha1 => f.write_str("sha1"),
            Op::Ripemd160 => f.write_str("ripemd160"),
            Op::Sha256 => f.write_str("sha256"),
            Op::Keccak256 => f.write_str("keccak256"),
            Op::Append(arg) => write!(f, "append {}", hex::encode(arg)),
            Op::Prepend(arg) => write!(f, "prepend {}", hex::encode(arg)),
            Op::Reverse => f.write_str("reverse"),
            Op::Hexlify => f.write_str("hexlify"),
        }
    }
}

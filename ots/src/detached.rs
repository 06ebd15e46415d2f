//! Detached timestamp files (`.ots`)
//!
//! A detached proof is the header magic, a major version, the operation
//! used to hash the stamped file, the file digest and the timestamp tree
//! for that digest.

use std::fmt;

use crate::error::Error;
use crate::op::Op;
use crate::ser::Deserializer;
use crate::ser::Serializer;
use crate::timestamp::Timestamp;

/// The ASCII marker that identifies OpenTimestamps proofs.
pub const MAGIC_MARKER: &[u8; 14] = b"OpenTimestamps";

/// Header magic of a detached proof. The ASCII marker starts at offset 1.
pub const HEADER_MAGIC: &[u8; 31] =
    b"\x00OpenTimestamps\x00\x00Proof\x00\xbf\x89\xe2\xe8\x84\xe8\x92\x94";

/// The only major version we read and write.
pub const MAJOR_VERSION: u64 = 1;

/// Whether `bytes` start with the detached proof header magic.
pub fn has_magic(bytes: &[u8]) -> bool {
    bytes.starts_with(HEADER_MAGIC)
}

/// A parsed `.ots` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedTimestampFile {
    file_hash_op: Op,
    timestamp: Timestamp,
}

impl DetachedTimestampFile {
    /// Create a detached proof for a digest produced by `file_hash_op`.
    pub fn new(file_hash_op: Op, timestamp: Timestamp) -> Result<Self, Error> {
        let expected = file_hash_op
            .digest_len()
            .ok_or_else(|| Error::NotAFileHashOp(file_hash_op.clone()))?;
        let actual = timestamp.msg().len();
        if actual != expected {
            return Err(Error::DigestLength { op: file_hash_op, expected, actual });
        }
        Ok(Self { file_hash_op, timestamp })
    }

    /// Create a detached proof for a SHA-256 file digest.
    pub fn from_sha256(timestamp: Timestamp) -> Result<Self, Error> {
        Self::new(Op::Sha256, timestamp)
    }

    /// The operation the file was hashed with.
    pub fn file_hash_op(&self) -> &Op {
        &self.file_hash_op
    }

    /// The committed file digest.
    pub fn file_digest(&self) -> &[u8] {
        self.timestamp.msg()
    }

    /// The timestamp tree for the file digest.
    pub fn timestamp(&self) -> &Timestamp {
        &self.timestamp
    }

    /// Mutable access to the timestamp tree, for upgrades.
    pub fn timestamp_mut(&mut self) -> &mut Timestamp {
        &mut self.timestamp
    }

    /// Serialize into the `.ots` byte format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut ser = Serializer::new();
        ser.write_bytes(HEADER_MAGIC);
        ser.write_varuint(MAJOR_VERSION);
        self.file_hash_op.serialize(&mut ser);
        ser.write_bytes(self.timestamp.msg());
        self.timestamp.serialize(&mut ser)?;
        Ok(ser.into_bytes())
    }

    /// Parse the `.ots` byte format. Every byte must be consumed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if !has_magic(bytes) {
            return Err(Error::BadMagic);
        }

        let mut de = Deserializer::new(bytes);
        de.read_bytes(HEADER_MAGIC.len())?;

        let version = de.read_varuint()?;
        if version != MAJOR_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        let file_hash_op = Op::deserialize(&mut de)?;
        let digest_len = file_hash_op
            .digest_len()
            .ok_or_else(|| Error::NotAFileHashOp(file_hash_op.clone()))?;
        let digest = de.read_bytes(digest_len)?.to_vec();

        let timestamp = Timestamp::deserialize(&mut de, digest)?;
        de.finish()?;

        Ok(Self { file_hash_op, timestamp })
    }
}

impl fmt::Display for DetachedTimestampFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "File {} hash: {}",
            self.file_hash_op,
            hex::encode(self.file_digest())
        )?;
        writeln!(f, "Timestamp:")?;
        write!(f, "{}", self.timestamp)
    }
}

//! Module with testing utility functions.

#![allow(clippy::unwrap_in_result, clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;

use bitcoin::absolute::LockTime;
use bitcoin::block::Header;
use bitcoin::block::Version as BlockVersion;
use bitcoin::hashes::Hash as _;
use bitcoin::script::PushBytesBuf;
use bitcoin::transaction::Version;
use bitcoin::Amount;
use bitcoin::BlockHash;
use bitcoin::CompactTarget;
use bitcoin::OutPoint;
use bitcoin::ScriptBuf;
use bitcoin::Sequence;
use bitcoin::Transaction;
use bitcoin::TxIn;
use bitcoin::TxMerkleNode;
use bitcoin::TxOut;
use bitcoin::Witness;
use url::Url;

use crate::attestation::Attestation;
use crate::detached::DetachedTimestampFile;
use crate::error::Error;
use crate::op::Op;
use crate::oracle::BlockHeaderOracle;
use crate::timestamp::Timestamp;

/// SHA-256 of the empty byte string.
pub const EMPTY_SHA256: [u8; 32] = [
    0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f, 0xb9, 0x24,
    0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b, 0x78, 0x52, 0xb8, 0x55,
];

/// Calendar used in pending fixtures.
pub const CALENDAR_URL: &str = "https://alice.btc.calendar.opentimestamps.org";

/// Nonce appended to the file digest in fixtures.
pub const NONCE: [u8; 16] = [0x5a; 16];

/// Build the tree `digest -> append(nonce) -> sha256`, returning the root
/// and a copy of the commitment message.
fn nonce_tree(digest: [u8; 32]) -> (Timestamp, Vec<u8>) {
    let mut root = Timestamp::new(digest.to_vec());
    let commitment = root
        .add_op(Op::Append(NONCE.to_vec()))
        .unwrap()
        .add_op(Op::Sha256)
        .unwrap()
        .msg()
        .to_vec();
    (root, commitment)
}

/// The commitment a calendar is asked about for [`pending_receipt`].
pub fn pending_commitment(digest: [u8; 32]) -> Vec<u8> {
    nonce_tree(digest).1
}

/// A receipt for `digest` that is pending at [`CALENDAR_URL`].
pub fn pending_receipt(digest: [u8; 32]) -> DetachedTimestampFile {
    pending_receipt_at(digest, CALENDAR_URL)
}

/// A receipt for `digest` that is pending at `calendar`.
pub fn pending_receipt_at(digest: [u8; 32], calendar: &str) -> DetachedTimestampFile {
    let (mut root, commitment) = nonce_tree(digest);
    root.find_mut(&commitment)
        .unwrap()
        .add_attestation(Attestation::Pending { uri: calendar.to_string() });
    DetachedTimestampFile::from_sha256(root).unwrap()
}

/// A transaction with an OP_RETURN output carrying `commitment`.
pub fn anchoring_transaction(commitment: [u8; 32]) -> Transaction {
    let data = PushBytesBuf::try_from(commitment.to_vec()).unwrap();
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::ZERO,
            script_pubkey: ScriptBuf::new_op_return(data),
        }],
    }
}

/// A calendar answer for `commitment` that proves inclusion in a Bitcoin
/// block at `height`: the commitment goes into a transaction whose txid
/// is hashed with a sibling into the merkle root.
pub fn bitcoin_upgrade(commitment: &[u8], height: u64) -> Timestamp {
    let commitment: [u8; 32] = commitment.try_into().expect("commitment is 32 bytes");
    let tx_bytes = bitcoin::consensus::serialize(&anchoring_transaction(commitment));
    let position = tx_bytes
        .windows(32)
        .position(|window| window == commitment)
        .unwrap();

    let mut root = Timestamp::new(commitment.to_vec());
    root.add_op(Op::Prepend(tx_bytes[..position].to_vec()))
        .unwrap()
        .add_op(Op::Append(tx_bytes[position + 32..].to_vec()))
        .unwrap()
        .add_op(Op::Sha256)
        .unwrap()
        .add_op(Op::Sha256)
        .unwrap()
        .add_op(Op::Append(vec![0x77; 32]))
        .unwrap()
        .add_op(Op::Sha256)
        .unwrap()
        .add_op(Op::Sha256)
        .unwrap()
        .add_attestation(Attestation::Bitcoin { height });
    root
}

/// A receipt for `digest` carrying a Bitcoin attestation at `height`
/// next to the pending attestation it was upgraded from.
pub fn confirmed_receipt(digest: [u8; 32], height: u64) -> DetachedTimestampFile {
    let mut file = pending_receipt(digest);
    let commitment = pending_commitment(digest);
    file.timestamp_mut()
        .find_mut(&commitment)
        .unwrap()
        .merge(bitcoin_upgrade(&commitment, height))
        .unwrap();
    file
}

/// A block header whose merkle root is `merkle_root`.
pub fn header_committing_to(merkle_root: &[u8], time: u32) -> Header {
    let merkle_root: [u8; 32] = merkle_root.try_into().expect("merkle root is 32 bytes");
    Header {
        version: BlockVersion::TWO,
        prev_blockhash: BlockHash::all_zeros(),
        merkle_root: TxMerkleNode::from_byte_array(merkle_root),
        time,
        bits: CompactTarget::from_consensus(0x1d00ffff),
        nonce: 0,
    }
}

/// A block header oracle backed by a map.
#[derive(Debug, Default, Clone)]
pub struct StaticOracle {
    headers: HashMap<u64, Header>,
    failing: bool,
}

impl StaticOracle {
    /// Serve `header` for `height`.
    pub fn with_header(mut self, height: u64, header: Header) -> Self {
        self.headers.insert(height, header);
        self
    }

    /// An oracle whose every request fails.
    pub fn failing() -> Self {
        Self { headers: HashMap::new(), failing: true }
    }
}

impl BlockHeaderOracle for StaticOracle {
    async fn block_header(&self, height: u64) -> Result<Option<Header>, Error> {
        if self.failing {
            let url = Url::parse("http://oracle.invalid").unwrap();
            return Err(Error::EsploraStatus(reqwest::StatusCode::SERVICE_UNAVAILABLE, url));
        }
        Ok(self.headers.get(&height).copied())
    }
}

//! The timestamp commitment tree
//!
//! A [`Timestamp`] proves that its message existed before each of the
//! attestations reachable from it. Every node holds a message, the
//! attestations made directly on that message, and a map of operations
//! to the child timestamps for the operation results.
//!
//! ## Serialization
//!
//! A node is serialized as the list of its items, attestations first and
//! then operations, each item except the last prefixed with `0xff`:
//!
//! ```text
//! node       = *( 0xff item ) item
//! item       = 0x00 attestation | op node
//! ```
//!
//! A node with no items cannot be represented, so an empty timestamp is
//! a serialization error.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use bitcoin::Transaction;
use bitcoin::Txid;

use crate::attestation::Attestation;
use crate::error::Error;
use crate::op::Op;
use crate::ser::Deserializer;
use crate::ser::Serializer;

/// Maximum nesting depth of a timestamp tree.
pub const MAX_RECURSION_DEPTH: usize = 256;

/// Marker separating the items of a node.
const ITEM_SEPARATOR: u8 = 0xff;

/// Marker introducing an attestation item.
const ATTESTATION_MARKER: u8 = 0x00;

/// A node of the commitment tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    msg: Vec<u8>,
    attestations: BTreeSet<Attestation>,
    ops: BTreeMap<Op, Timestamp>,
}

/// A Bitcoin attestation together with what the path to it commits to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitcoinAnchor {
    /// The claimed block height.
    pub height: u64,
    /// The attested message, which must equal the block merkle root.
    pub merkle_root: Vec<u8>,
    /// The transaction the path goes through, when it can be identified.
    pub txid: Option<Txid>,
}

impl Timestamp {
    /// Create a timestamp for a message with no attestations or ops.
    pub fn new(msg: impl Into<Vec<u8>>) -> Self {
        Self {
            msg: msg.into(),
            attestations: BTreeSet::new(),
            ops: BTreeMap::new(),
        }
    }

    /// The message this timestamp is for.
    pub fn msg(&self) -> &[u8] {
        &self.msg
    }

    /// Attestations made directly on this message.
    pub fn attestations(&self) -> &BTreeSet<Attestation> {
        &self.attestations
    }

    /// Operations applied to this message and their timestamps.
    pub fn ops(&self) -> &BTreeMap<Op, Timestamp> {
        &self.ops
    }

    /// Whether the node has neither attestations nor operations.
    pub fn is_empty(&self) -> bool {
        self.attestations.is_empty() && self.ops.is_empty()
    }

    /// Add an attestation to this node. Returns false if it was present.
    pub fn add_attestation(&mut self, attestation: Attestation) -> bool {
        self.attestations.insert(attestation)
    }

    /// Add an operation, returning the timestamp for its result. An
    /// existing subtree for the same operation is returned unchanged.
    pub fn add_op(&mut self, op: Op) -> Result<&mut Timestamp, Error> {
        match self.ops.entry(op) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let msg = entry.key().apply(&self.msg)?;
                Ok(entry.insert(Timestamp::new(msg)))
            }
        }
    }

    /// Merge all attestations and operations of `other` into this tree.
    ///
    /// Both timestamps must be for the same message.
    pub fn merge(&mut self, other: Timestamp) -> Result<(), Error> {
        if self.msg != other.msg {
            return Err(Error::MergeMismatch(hex::encode(&self.msg), hex::encode(&other.msg)));
        }

        self.attestations.extend(other.attestations);
        for (op, child) in other.ops {
            match self.ops.entry(op) {
                Entry::Occupied(entry) => entry.into_mut().merge(child)?,
                Entry::Vacant(entry) => {
                    entry.insert(child);
                }
            }
        }
        Ok(())
    }

    /// Find the first node, depth first, whose message is `msg`.
    pub fn find_mut(&mut self, msg: &[u8]) -> Option<&mut Timestamp> {
        if self.msg == msg {
            return Some(self);
        }
        self.ops.values_mut().find_map(|child| child.find_mut(msg))
    }

    /// Find the first node, depth first, whose message is `msg`.
    pub fn find(&self, msg: &[u8]) -> Option<&Timestamp> {
        if self.msg == msg {
            return Some(self);
        }
        self.ops.values().find_map(|child| child.find(msg))
    }

    /// Every attestation in the tree with the message it attests to.
    pub fn all_attestations(&self) -> Vec<(&[u8], &Attestation)> {
        let mut found = Vec::new();
        self.collect_attestations(&mut found);
        found
    }

    fn collect_attestations<'a>(&'a self, found: &mut Vec<(&'a [u8], &'a Attestation)>) {
        found.extend(self.attestations.iter().map(|a| (self.msg.as_slice(), a)));
        for child in self.ops.values() {
            child.collect_attestations(found);
        }
    }

    /// Pending attestations as `(commitment, calendar uri)` pairs.
    pub fn pending_attestations(&self) -> Vec<(&[u8], &str)> {
        self.all_attestations()
            .into_iter()
            .filter_map(|(msg, a)| a.pending_uri().map(|uri| (msg, uri)))
            .collect()
    }

    /// Whether the tree holds at least one Bitcoin attestation.
    pub fn is_complete(&self) -> bool {
        self.all_attestations()
            .iter()
            .any(|(_, a)| a.bitcoin_height().is_some())
    }

    /// Every Bitcoin attestation, with the transaction its path runs
    /// through when one can be recognised.
    ///
    /// The anchoring transaction is the first message on the path that is
    /// double SHA-256 hashed and decodes as a Bitcoin transaction.
    pub fn bitcoin_anchors(&self) -> Vec<BitcoinAnchor> {
        let mut anchors = Vec::new();
        let mut path = Vec::new();
        self.collect_anchors(&mut path, &mut anchors);
        anchors
    }

    fn collect_anchors<'a>(&'a self, path: &mut Vec<(&'a [u8], &'a Op)>, anchors: &mut Vec<BitcoinAnchor>) {
        for height in self.attestations.iter().filter_map(Attestation::bitcoin_height) {
            anchors.push(BitcoinAnchor {
                height,
                merkle_root: self.msg.clone(),
                txid: anchoring_txid(path),
            });
        }
        for (op, child) in &self.ops {
            path.push((self.msg.as_slice(), op));
            child.collect_anchors(path, anchors);
            path.pop();
        }
    }

    /// Serialize the tree rooted at this node.
    pub fn serialize(&self, ser: &mut Serializer) -> Result<(), Error> {
        if self.is_empty() {
            return Err(Error::EmptyTimestamp(hex::encode(&self.msg)));
        }

        let mut remaining = self.attestations.len() + self.ops.len();
        let mut separator = |ser: &mut Serializer| {
            remaining -= 1;
            if remaining > 0 {
                ser.write_byte(ITEM_SEPARATOR);
            }
        };

        for attestation in &self.attestations {
            separator(ser);
            ser.write_byte(ATTESTATION_MARKER);
            attestation.serialize(ser);
        }
        for (op, child) in &self.ops {
            separator(ser);
            op.serialize(ser);
            child.serialize(ser)?;
        }
        Ok(())
    }

    /// Serialize the tree into a new buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut ser = Serializer::new();
        self.serialize(&mut ser)?;
        Ok(ser.into_bytes())
    }

    /// Deserialize a tree for `msg`.
    pub fn deserialize(de: &mut Deserializer, msg: Vec<u8>) -> Result<Self, Error> {
        Self::deserialize_at_depth(de, msg, 0)
    }

    /// Deserialize a tree for `msg` that must span all of `bytes`.
    pub fn from_bytes(bytes: &[u8], msg: Vec<u8>) -> Result<Self, Error> {
        let mut de = Deserializer::new(bytes);
        let timestamp = Self::deserialize(&mut de, msg)?;
        de.finish()?;
        Ok(timestamp)
    }

    fn deserialize_at_depth(de: &mut Deserializer, msg: Vec<u8>, depth: usize) -> Result<Self, Error> {
        if depth > MAX_RECURSION_DEPTH {
            return Err(Error::RecursionLimit(MAX_RECURSION_DEPTH));
        }

        let mut timestamp = Timestamp::new(msg);
        let mut tag = de.read_byte()?;
        while tag == ITEM_SEPARATOR {
            let item_tag = de.read_byte()?;
            timestamp.deserialize_item(item_tag, de, depth)?;
            tag = de.read_byte()?;
        }
        timestamp.deserialize_item(tag, de, depth)?;

        Ok(timestamp)
    }

    fn deserialize_item(&mut self, tag: u8, de: &mut Deserializer, depth: usize) -> Result<(), Error> {
        if tag == ATTESTATION_MARKER {
            self.attestations.insert(Attestation::deserialize(de)?);
            return Ok(());
        }

        let op = Op::deserialize_with_tag(tag, de)?;
        let child_msg = op.apply(&self.msg)?;
        let child = Self::deserialize_at_depth(de, child_msg, depth + 1)?;
        match self.ops.entry(op) {
            Entry::Occupied(entry) => entry.into_mut().merge(child)?,
            Entry::Vacant(entry) => {
                entry.insert(child);
            }
        }
        Ok(())
    }

    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = "    ".repeat(indent);
        for attestation in &self.attestations {
            writeln!(f, "{pad}verify {attestation}")?;
        }

        let branching = self.ops.len() > 1;
        for (op, child) in &self.ops {
            if branching {
                writeln!(f, "{pad} -> {op}")?;
                child.fmt_tree(f, indent + 1)?;
            } else {
                writeln!(f, "{pad}{op}")?;
                child.fmt_tree(f, indent)?;
            }
        }
        Ok(())
    }
}

fn anchoring_txid(path: &[(&[u8], &Op)]) -> Option<Txid> {
    path.windows(2).find_map(|pair| {
        let [(msg, first), (_, second)] = pair else {
            return None;
        };
        if **first != Op::Sha256 || **second != Op::Sha256 {
            return None;
        }
        bitcoin::consensus::deserialize::<Transaction>(msg)
            .ok()
            .map(|tx| tx.compute_txid())
    })
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f, 0)
    }
}

//! Receipt verification
//!
//! [`verify_receipt`] decides, from the receipt bytes alone, whether a
//! receipt is well formed, whether it commits to the candidate digest and
//! which attestations it carries. [`verify_with_oracle`] goes one step
//! further and checks each Bitcoin attestation against a block header.
//!
//! Verification never fails: malformed input is reported as
//! [`VerificationStatus::Invalid`] with a reason, and oracle failures
//! leave the affected attestation unchecked.

use bitcoin::hashes::Hash as _;

use crate::attestation::Attestation;
use crate::detached::DetachedTimestampFile;
use crate::op::Op;
use crate::oracle::BlockHeaderOracle;
use crate::timestamp::BitcoinAnchor;

/// Outcome of verifying a receipt against a candidate digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    /// The receipt could not be parsed, or its attestations are false.
    Invalid {
        /// Human readable reason
        reason: String,
    },
    /// The receipt is well formed but commits to a different digest.
    Mismatch {
        /// Hex encoded digest the receipt commits to
        committed: String,
    },
    /// No Bitcoin attestation yet.
    Pending {
        /// Calendars that promised to anchor the digest
        calendars: Vec<String>,
    },
    /// At least one Bitcoin attestation.
    Complete {
        /// Attested block heights, ascending
        heights: Vec<u64>,
    },
}

impl VerificationStatus {
    /// A short lowercase label for the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Invalid { .. } => "invalid",
            VerificationStatus::Mismatch { .. } => "mismatch",
            VerificationStatus::Pending { .. } => "pending",
            VerificationStatus::Complete { .. } => "complete",
        }
    }

    /// Whether the receipt is a valid proof for the candidate.
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationStatus::Pending { .. } | VerificationStatus::Complete { .. })
    }

    /// A sentence describing the status.
    pub fn describe(&self) -> String {
        match self {
            VerificationStatus::Invalid { reason } => format!("invalid receipt: {reason}"),
            VerificationStatus::Mismatch { committed } => {
                format!("receipt commits to a different digest ({committed})")
            }
            VerificationStatus::Pending { calendars } if calendars.is_empty() => {
                "timestamp has no bitcoin attestation yet".to_string()
            }
            VerificationStatus::Pending { calendars } => {
                format!("timestamp pending at {}", calendars.join(", "))
            }
            VerificationStatus::Complete { heights } => {
                let heights: Vec<String> = heights.iter().map(u64::to_string).collect();
                format!("timestamp anchored in bitcoin block {}", heights.join(", "))
            }
        }
    }
}

/// Result of checking a Bitcoin attestation against a block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttestationCheck {
    /// No oracle was consulted.
    Unchecked,
    /// The block merkle root matches the attested message.
    Verified {
        /// Block header time, seconds since the epoch
        time: u32,
    },
    /// The block at that height has a different merkle root.
    Mismatch,
    /// The oracle could not provide the header.
    HeaderUnavailable {
        /// Why the header is unavailable
        reason: String,
    },
}

/// A Bitcoin attestation and the outcome of checking it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorVerification {
    /// The attestation and what it commits to
    pub anchor: BitcoinAnchor,
    /// The result of the header check
    pub check: AttestationCheck,
}

/// Everything learned from verifying a receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Overall status
    pub status: VerificationStatus,
    /// All attestations found in the receipt
    pub attestations: Vec<Attestation>,
    /// Bitcoin attestations with their checks
    pub anchors: Vec<AnchorVerification>,
}

impl Verification {
    fn invalid(reason: impl Into<String>) -> Self {
        Self {
            status: VerificationStatus::Invalid { reason: reason.into() },
            attestations: Vec::new(),
            anchors: Vec::new(),
        }
    }

    /// The lowest attested block height not contradicted by a header.
    pub fn block_height(&self) -> Option<u64> {
        self.usable_anchors().map(|a| a.anchor.height).min()
    }

    /// The earliest verified block time.
    pub fn block_time(&self) -> Option<u32> {
        self.anchors
            .iter()
            .filter_map(|a| match a.check {
                AttestationCheck::Verified { time } => Some(time),
                _ => None,
            })
            .min()
    }

    /// The anchoring transaction of the lowest usable attestation.
    pub fn txid(&self) -> Option<bitcoin::Txid> {
        self.usable_anchors()
            .filter(|a| a.anchor.txid.is_some())
            .min_by_key(|a| a.anchor.height)
            .and_then(|a| a.anchor.txid)
    }

    fn usable_anchors(&self) -> impl Iterator<Item = &AnchorVerification> {
        self.anchors
            .iter()
            .filter(|a| a.check != AttestationCheck::Mismatch)
    }
}

/// Verify `receipt` against a candidate SHA-256 digest without any
/// network access.
pub fn verify_receipt(receipt: &[u8], candidate: &[u8; 32]) -> Verification {
    let file = match DetachedTimestampFile::from_bytes(receipt) {
        Ok(file) => file,
        Err(err) => return Verification::invalid(err.to_string()),
    };

    if *file.file_hash_op() != Op::Sha256 {
        return Verification::invalid(format!(
            "receipt commits to a {} digest, expected sha256",
            file.file_hash_op()
        ));
    }

    let timestamp = file.timestamp();
    let attestations: Vec<Attestation> = timestamp
        .all_attestations()
        .into_iter()
        .map(|(_, attestation)| attestation.clone())
        .collect();

    if file.file_digest() != candidate {
        return Verification {
            status: VerificationStatus::Mismatch { committed: hex::encode(file.file_digest()) },
            attestations,
            anchors: Vec::new(),
        };
    }

    let anchors: Vec<AnchorVerification> = timestamp
        .bitcoin_anchors()
        .into_iter()
        .map(|anchor| AnchorVerification { anchor, check: AttestationCheck::Unchecked })
        .collect();

    let status = status_for(&attestations, &anchors);
    Verification { status, attestations, anchors }
}

fn status_for(attestations: &[Attestation], anchors: &[AnchorVerification]) -> VerificationStatus {
    if anchors.is_empty() {
        let mut calendars: Vec<String> = attestations
            .iter()
            .filter_map(|a| a.pending_uri().map(str::to_string))
            .collect();
        calendars.sort();
        calendars.dedup();
        return VerificationStatus::Pending { calendars };
    }

    let mut heights: Vec<u64> = anchors
        .iter()
        .filter(|a| a.check != AttestationCheck::Mismatch)
        .map(|a| a.anchor.height)
        .collect();
    heights.sort_unstable();
    heights.dedup();

    if heights.is_empty() {
        let claimed: Vec<String> = anchors.iter().map(|a| a.anchor.height.to_string()).collect();
        return VerificationStatus::Invalid {
            reason: format!(
                "bitcoin attestation at height {} does not match the block merkle root",
                claimed.join(", ")
            ),
        };
    }
    VerificationStatus::Complete { heights }
}

/// Verify `receipt` and check every Bitcoin attestation against the
/// block header provided by `oracle`.
#[tracing::instrument(skip_all)]
pub async fn verify_with_oracle<O>(receipt: &[u8], candidate: &[u8; 32], oracle: &O) -> Verification
where
    O: BlockHeaderOracle,
{
    let mut verification = verify_receipt(receipt, candidate);
    if verification.anchors.is_empty() {
        return verification;
    }

    for anchor in verification.anchors.iter_mut() {
        anchor.check = check_anchor(&anchor.anchor, oracle).await;
    }
    verification.status = status_for(&verification.attestations, &verification.anchors);
    verification
}

async fn check_anchor<O: BlockHeaderOracle>(anchor: &BitcoinAnchor, oracle: &O) -> AttestationCheck {
    let header = match oracle.block_header(anchor.height).await {
        Ok(Some(header)) => header,
        Ok(None) => {
            return AttestationCheck::HeaderUnavailable {
                reason: format!("no block at height {}", anchor.height),
            }
        }
        Err(error) => {
            tracing::warn!(%error, height = anchor.height, "could not fetch block header");
            return AttestationCheck::HeaderUnavailable { reason: error.to_string() };
        }
    };

    if header.merkle_root.to_byte_array().as_slice() == anchor.merkle_root.as_slice() {
        AttestationCheck::Verified { time: header.time }
    } else {
        tracing::warn!(height = anchor.height, "attested message does not match the block merkle root");
        AttestationCheck::Mismatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detached::HEADER_MAGIC;
    use crate::testing;
    use crate::testing::StaticOracle;
    use proptest::prelude::*;

    #[test]
    fn matching_pending_receipt() {
        let receipt = testing::pending_receipt(testing::EMPTY_SHA256).to_bytes().unwrap();
        let verification = verify_receipt(&receipt, &testing::EMPTY_SHA256);

        assert_eq!(
            verification.status,
            VerificationStatus::Pending { calendars: vec![testing::CALENDAR_URL.to_string()] }
        );
        assert!(verification.status.is_valid());
        assert_eq!(verification.block_height(), None);
    }

    #[test]
    fn other_digest_is_mismatch() {
        let receipt = testing::pending_receipt(testing::EMPTY_SHA256).to_bytes().unwrap();
        let verification = verify_receipt(&receipt, &[0xab; 32]);

        match verification.status {
            VerificationStatus::Mismatch { committed } => {
                assert_eq!(committed, hex::encode(testing::EMPTY_SHA256))
            }
            status => panic!("unexpected status: {status:?}"),
        }
    }

    #[test]
    fn complete_receipt_reports_heights() {
        let receipt = testing::confirmed_receipt(testing::EMPTY_SHA256, 840_000);
        let verification = verify_receipt(&receipt.to_bytes().unwrap(), &testing::EMPTY_SHA256);

        assert_eq!(verification.status, VerificationStatus::Complete { heights: vec![840_000] });
        assert_eq!(verification.block_height(), Some(840_000));
        assert!(verification.txid().is_some());
    }

    #[test]
    fn garbage_is_invalid() {
        let verification = verify_receipt(b"definitely not a receipt", &testing::EMPTY_SHA256);
        match verification.status {
            VerificationStatus::Invalid { reason } => assert!(reason.contains("magic")),
            status => panic!("unexpected status: {status:?}"),
        }
    }

    #[test]
    fn ascii_marker_alone_is_invalid() {
        let verification = verify_receipt(b"OpenTimestamps", &testing::EMPTY_SHA256);
        assert_eq!(verification.status.as_str(), "invalid");
    }

    #[test]
    fn non_sha256_receipt_is_invalid() {
        let mut stamp = crate::timestamp::Timestamp::new(vec![0x22; 20]);
        stamp.add_attestation(Attestation::Bitcoin { height: 1 });
        let receipt = DetachedTimestampFile::new(Op::Ripemd160, stamp).unwrap();

        let verification = verify_receipt(&receipt.to_bytes().unwrap(), &[0x22; 32]);
        assert_eq!(verification.status.as_str(), "invalid");
    }

    fn receipt_with_tree(tree: &[u8]) -> Vec<u8> {
        let mut ser = crate::ser::Serializer::new();
        ser.write_bytes(HEADER_MAGIC);
        ser.write_varuint(crate::detached::MAJOR_VERSION);
        Op::Sha256.serialize(&mut ser);
        ser.write_bytes(&testing::EMPTY_SHA256);
        ser.write_bytes(tree);
        ser.into_bytes()
    }

    fn oversized_op_argument() -> Vec<u8> {
        let mut ser = crate::ser::Serializer::new();
        Op::Append(vec![0x00; crate::op::MAX_RESULT_LENGTH + 1]).serialize(&mut ser);
        ser.write_byte(0x00);
        Attestation::Bitcoin { height: 1 }.serialize(&mut ser);
        ser.into_bytes()
    }

    fn oversized_pending_uri() -> Vec<u8> {
        let mut payload = crate::ser::Serializer::new();
        payload.write_varbytes("a".repeat(crate::attestation::MAX_URI_LENGTH + 1).as_bytes());
        let mut ser = crate::ser::Serializer::new();
        ser.write_byte(0x00);
        ser.write_bytes(&crate::attestation::PENDING_TAG);
        ser.write_varbytes(&payload.into_bytes());
        ser.into_bytes()
    }

    fn oversized_attestation_payload() -> Vec<u8> {
        let mut ser = crate::ser::Serializer::new();
        ser.write_byte(0x00);
        ser.write_bytes(&[0x01; crate::attestation::TAG_SIZE]);
        ser.write_varbytes(&vec![0x00; crate::attestation::MAX_PAYLOAD_SIZE + 1]);
        ser.into_bytes()
    }

    #[test_case::test_case(oversized_op_argument(); "op argument")]
    #[test_case::test_case(oversized_pending_uri(); "pending uri")]
    #[test_case::test_case(oversized_attestation_payload(); "attestation payload")]
    fn oversized_fields_make_the_receipt_invalid(tree: Vec<u8>) {
        let verification = verify_receipt(&receipt_with_tree(&tree), &testing::EMPTY_SHA256);
        match verification.status {
            VerificationStatus::Invalid { reason } => assert!(reason.contains("length"), "{reason}"),
            status => panic!("unexpected status: {status:?}"),
        }
    }

    #[test]
    fn fields_at_their_limits_parse() {
        let mut ser = crate::ser::Serializer::new();
        Op::Append(vec![0x00; crate::op::MAX_RESULT_LENGTH - 32]).serialize(&mut ser);
        ser.write_byte(0x00);
        Attestation::Pending { uri: "a".repeat(crate::attestation::MAX_URI_LENGTH) }.serialize(&mut ser);

        let verification = verify_receipt(&receipt_with_tree(&ser.into_bytes()), &testing::EMPTY_SHA256);
        assert_eq!(verification.status.as_str(), "pending");
    }

    #[tokio::test]
    async fn oracle_confirms_merkle_root() {
        let receipt = testing::confirmed_receipt(testing::EMPTY_SHA256, 840_000);
        let anchor = receipt.timestamp().bitcoin_anchors().remove(0);
        let oracle = StaticOracle::default()
            .with_header(840_000, testing::header_committing_to(&anchor.merkle_root, 1_713_571_767));

        let verification =
            verify_with_oracle(&receipt.to_bytes().unwrap(), &testing::EMPTY_SHA256, &oracle).await;

        assert_eq!(verification.status.as_str(), "complete");
        assert_eq!(verification.block_time(), Some(1_713_571_767));
    }

    #[tokio::test]
    async fn oracle_rejects_wrong_merkle_root() {
        let receipt = testing::confirmed_receipt(testing::EMPTY_SHA256, 840_000);
        let oracle = StaticOracle::default()
            .with_header(840_000, testing::header_committing_to(&[0x00; 32], 1_713_571_767));

        let verification =
            verify_with_oracle(&receipt.to_bytes().unwrap(), &testing::EMPTY_SHA256, &oracle).await;

        assert_eq!(verification.status.as_str(), "invalid");
        assert_eq!(verification.anchors[0].check, AttestationCheck::Mismatch);
        assert_eq!(verification.block_height(), None);
    }

    #[tokio::test]
    async fn oracle_failure_is_not_fatal() {
        let receipt = testing::confirmed_receipt(testing::EMPTY_SHA256, 840_000);
        let oracle = StaticOracle::failing();

        let verification =
            verify_with_oracle(&receipt.to_bytes().unwrap(), &testing::EMPTY_SHA256, &oracle).await;

        assert_eq!(verification.status, VerificationStatus::Complete { heights: vec![840_000] });
        assert!(matches!(
            verification.anchors[0].check,
            AttestationCheck::HeaderUnavailable { .. }
        ));
        assert_eq!(verification.block_time(), None);
    }

    proptest! {
        #[test]
        fn bytes_without_magic_are_invalid(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            prop_assume!(!bytes.starts_with(HEADER_MAGIC));
            let verification = verify_receipt(&bytes, &testing::EMPTY_SHA256);
            prop_assert_eq!(verification.status.as_str(), "invalid");
        }

        #[test]
        fn arbitrary_tails_never_panic(tail in proptest::collection::vec(any::<u8>(), 0..512)) {
            let mut bytes = HEADER_MAGIC.to_vec();
            bytes.push(0x01);
            bytes.push(0x08);
            bytes.extend_from_slice(&testing::EMPTY_SHA256);
            bytes.extend_from_slice(&tail);
            let _ = verify_receipt(&bytes, &testing::EMPTY_SHA256);
        }

        #[test]
        fn status_follows_digest_equality(candidate in any::<[u8; 32]>(), height in 1u64..1_000_000) {
            let receipt = testing::confirmed_receipt(testing::EMPTY_SHA256, height).to_bytes().unwrap();
            let status = verify_receipt(&receipt, &candidate).status;
            if candidate == testing::EMPTY_SHA256 {
                prop_assert_ne!(status.as_str(), "mismatch");
            } else {
                prop_assert_eq!(status.as_str(), "mismatch");
            }
        }
    }
}

#![deny(missing_docs)]

//! # OpenTimestamps proofs
//!
//! Parsing, serialization, verification and upgrading of OpenTimestamps
//! proofs. A proof commits a file digest to one or more attestations
//! through a tree of hash operations; see [`timestamp::Timestamp`] for the
//! tree and [`detached::DetachedTimestampFile`] for the `.ots` container.
//!
//! New proofs are created and pending ones upgraded through the calendar
//! servers in [`calendar`]. Bitcoin attestations are checked against block
//! headers from a [`oracle::BlockHeaderOracle`].

pub mod attestation;
pub mod calendar;
pub mod detached;
pub mod error;
pub mod op;
pub mod oracle;
pub mod ser;
pub mod timestamp;
pub mod verify;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use detached::DetachedTimestampFile;
pub use error::Error;
pub use timestamp::Timestamp;
pub use verify::verify_receipt;
pub use verify::verify_with_oracle;
pub use verify::VerificationStatus;

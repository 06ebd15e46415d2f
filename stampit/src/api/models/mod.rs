//! Request and response bodies of the API endpoints.

/// Health endpoint bodies.
pub mod health;
/// Ledger endpoint bodies.
pub mod ledger;
/// Stamp endpoint bodies.
pub mod stamp;
/// Verify endpoint bodies.
pub mod verify;

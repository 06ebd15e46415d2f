//! The HTTP API: stamping, verification, health and ledger endpoints.

pub mod handlers;
pub mod models;
pub mod routes;

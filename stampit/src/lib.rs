#![doc = include_str!("../README.md")]
#![deny(missing_docs)]

pub mod api;
pub mod common;
pub mod config;
pub mod context;
pub mod ledger;
pub mod logging;
pub mod rate_limit;
pub mod receipts;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

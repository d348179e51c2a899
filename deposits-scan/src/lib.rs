//! Block-range scanner for bridge `Deposit` events.
//!
//! Resolves a requested range against the chain tip, splits it into
//! `eth_getLogs`-sized fetch units, pulls the logs, stamps each decoded event
//! with its block time and hands the ordered result to a [`sink::Sink`].

pub mod config;
pub mod error;
pub mod fetcher;
pub mod range;
pub mod rpc;
pub mod scanner;
pub mod sink;

pub use error::ScanError;
pub use scanner::{ScanReport, ScanRequest, ScanState, Scanner};

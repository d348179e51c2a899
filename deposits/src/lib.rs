//! Domain types for scanning bridge `Deposit` events.
//!
//! This crate knows nothing about RPC transports or output formats. It holds
//! the fixed set of supported chains, the symbolic block references a caller
//! may pass, the `Deposit` event ABI with a validating decoder, and the
//! immutable [`DepositEvent`] record a scan produces.

pub mod events;
pub mod networks;
pub mod types;

pub use events::{DecodeError, Deposit};
pub use networks::Chain;
pub use types::{BlockRef, DepositEvent, ParseError};

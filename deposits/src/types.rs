//! Core domain types: block references and decoded deposit records.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::Log;
use chrono::{DateTime, Utc};

use crate::events::{self, DecodeError, Deposit};
use crate::networks::Chain;

/// Errors raised while turning caller-supplied strings into typed values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The chain identifier is not one of [`Chain::ALL`].
    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),

    /// A block bound is neither `latest` nor a non-negative integer.
    #[error("invalid block reference {0:?}: expected a block number or \"latest\"")]
    InvalidBlockRef(String),

    /// The contract address is not a 20-byte hex string.
    #[error("invalid contract address {input:?}: {reason}")]
    InvalidAddress {
        /// The rejected input.
        input: String,
        /// Why the hex parser rejected it.
        reason: String,
    },
}

/// One bound of a requested block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockRef {
    /// A concrete block number.
    Number(u64),
    /// The chain height at the moment the bound is resolved.
    Latest,
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Latest => f.write_str("latest"),
        }
    }
}

impl From<u64> for BlockRef {
    fn from(n: u64) -> Self {
        Self::Number(n)
    }
}

impl FromStr for BlockRef {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Ok(Self::Latest);
        }
        s.parse::<u64>()
            .map(Self::Number)
            .map_err(|_| ParseError::InvalidBlockRef(s.to_owned()))
    }
}

/// Parse a contract address, accepting any hex case.
///
/// # Errors
///
/// Returns [`ParseError::InvalidAddress`] if `s` is not 20 bytes of hex.
pub fn parse_address(s: &str) -> Result<Address, ParseError> {
    s.trim()
        .parse::<Address>()
        .map_err(|e| ParseError::InvalidAddress {
            input: s.to_owned(),
            reason: e.to_string(),
        })
}

/// A `Deposit` event decoded from a log and stamped with its block time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositEvent {
    /// Chain the log was read from.
    pub chain: Chain,
    /// Token being bridged (`topic1`).
    pub token: Address,
    /// Receiver on the destination side (`topic2`).
    pub recipient: Address,
    /// Full-width amount from the data section.
    pub amount: U256,
    /// Hash of the transaction that emitted the log.
    pub transaction_hash: B256,
    /// Contract that emitted the log.
    pub contract_address: Address,
    /// Block containing the log.
    pub block_number: u64,
    /// Position of the log within its block, when the node reports it.
    pub log_index: Option<u64>,
    /// Timestamp of the containing block.
    pub timestamp: DateTime<Utc>,
}

impl DepositEvent {
    /// Decode `log` as a `Deposit` and attach the block `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the log does not match the `Deposit` ABI or
    /// lacks the block number / transaction hash of a mined log.
    pub fn from_log(chain: Chain, log: &Log, timestamp: DateTime<Utc>) -> Result<Self, DecodeError> {
        Self::from_deposit(chain, log, events::decode_deposit(log)?, timestamp)
    }

    /// Build an event from a `deposit` already decoded from `log`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Pending`] if `log` lacks the block number or
    /// transaction hash of a mined log.
    pub fn from_deposit(
        chain: Chain,
        log: &Log,
        deposit: Deposit,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, DecodeError> {
        let block_number = log.block_number.ok_or(DecodeError::Pending("block number"))?;
        let transaction_hash = log
            .transaction_hash
            .ok_or(DecodeError::Pending("transaction hash"))?;

        Ok(Self {
            chain,
            token: deposit.token,
            recipient: deposit.recipient,
            amount: deposit.amount,
            transaction_hash,
            contract_address: log.address(),
            block_number,
            log_index: log.log_index,
            timestamp,
        })
    }

    /// The block timestamp as seconds since the Unix epoch.
    #[must_use]
    pub fn unix_timestamp(&self) -> i64 {
        self.timestamp.timestamp()
    }
}

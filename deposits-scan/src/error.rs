//! Errors that abort a scan.

use deposits::{Chain, DecodeError, ParseError};

use crate::rpc::ClientError;
use crate::sink::SinkError;

/// Every way a scan can fail. All kinds are terminal for the scan that
/// raised them; nothing is retried internally and nothing is persisted.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The chain identifier is not supported.
    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),

    /// A block bound is neither a number nor `latest`.
    #[error("invalid block reference {0:?}")]
    InvalidBlockRef(String),

    /// The contract address does not parse.
    #[error("invalid contract address {input:?}: {reason}")]
    InvalidAddress {
        /// The rejected input.
        input: String,
        /// Parser message.
        reason: String,
    },

    /// Reading the chain height to resolve a `latest` bound failed.
    #[error("could not read current height of {chain}: {source}")]
    HeightUnavailable {
        /// Chain being queried.
        chain: Chain,
        /// Underlying RPC failure.
        source: ClientError,
    },

    /// The resolved end block precedes the start block.
    #[error("end block {end} is before start block {start}")]
    InvalidRange {
        /// Resolved start.
        start: u64,
        /// Resolved end.
        end: u64,
    },

    /// `eth_getLogs` failed for one fetch unit.
    #[error("fetching logs for blocks {from}-{to} failed: {source}")]
    FetchFailure {
        /// First block of the failing unit.
        from: u64,
        /// Last block of the failing unit.
        to: u64,
        /// Underlying RPC failure.
        source: ClientError,
    },

    /// The timestamp of a log's block could not be read.
    #[error("resolving timestamp of block {block} failed: {source}")]
    TimestampResolutionFailure {
        /// Block whose header was requested.
        block: u64,
        /// Underlying RPC failure.
        source: ClientError,
    },

    /// A returned log does not match the `Deposit` event.
    #[error("log in transaction {tx} is not a Deposit: {source}")]
    DecodeFailure {
        /// Emitting transaction, or `pending` when the node omitted it.
        tx: String,
        /// Decoder message.
        source: DecodeError,
    },

    /// Writing the result to the sink failed.
    #[error(transparent)]
    Persist(#[from] SinkError),
}

impl ScanError {
    /// Whether re-running the same request may succeed.
    ///
    /// Only failures that originate from the RPC layer qualify; malformed
    /// requests and undecodable logs fail again on every attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::HeightUnavailable { .. }
                | Self::FetchFailure { .. }
                | Self::TimestampResolutionFailure { .. }
        )
    }
}

impl From<ParseError> for ScanError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::UnsupportedChain(chain) => Self::UnsupportedChain(chain),
            ParseError::InvalidBlockRef(input) => Self::InvalidBlockRef(input),
            ParseError::InvalidAddress { input, reason } => Self::InvalidAddress { input, reason },
        }
    }
}

//! The `Deposit` event ABI and its validating decoder.

use alloy::primitives::B256;
use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::SolEvent;

sol! {
    /// Emitted by the bridge contract when tokens are locked for transfer.
    event Deposit(address indexed token, address indexed recipient, uint256 amount);
}

/// Number of topics a `Deposit` log carries: the signature plus two indexed
/// addresses.
const DEPOSIT_TOPICS: usize = 3;

/// A log could not be decoded as a `Deposit`.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// `topic0` is missing or is not the `Deposit` signature hash.
    #[error("topic0 {0:?} is not the Deposit(address,address,uint256) signature")]
    Signature(Option<B256>),

    /// Wrong number of indexed topics.
    #[error("expected {DEPOSIT_TOPICS} topics, log has {0}")]
    TopicCount(usize),

    /// Topics or data do not decode against the ABI.
    #[error("abi decoding failed: {0}")]
    Abi(#[from] alloy::sol_types::Error),

    /// The log has not been mined yet and lacks the named field.
    #[error("log is missing its {0}")]
    Pending(&'static str),
}

/// Decode the three `Deposit` fields from a raw log.
///
/// The signature and topic count are checked up front so a log emitted by a
/// different event never reaches the ABI decoder.
///
/// # Errors
///
/// Returns [`DecodeError`] if the log does not match the `Deposit` ABI.
pub fn decode_deposit(log: &Log) -> Result<Deposit, DecodeError> {
    let topics = log.topics();
    match topics.first() {
        Some(t0) if *t0 == Deposit::SIGNATURE_HASH => {}
        other => return Err(DecodeError::Signature(other.copied())),
    }
    if topics.len() != DEPOSIT_TOPICS {
        return Err(DecodeError::TopicCount(topics.len()));
    }

    Ok(Deposit::decode_raw_log(
        topics.iter().copied(),
        &log.data().data,
    )?)
}

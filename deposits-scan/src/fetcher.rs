//! Log fetching per fetch unit and timestamp resolution per event.
//!
//! Units are fetched strictly in order, one round trip each, and every unit
//! must succeed before any log is decoded.

use std::collections::BTreeMap;

use alloy::primitives::Address;
use alloy::rpc::types::Log;
use chrono::{DateTime, Utc};
use deposits::{Chain, DecodeError, DepositEvent, events};

use crate::error::ScanError;
use crate::range::FetchUnit;
use crate::rpc::{ChainClient, ClientError, LogQuery};

/// Progress is logged every N units.
const PROGRESS_INTERVAL: usize = 50;

/// Fetch `Deposit` logs for every unit, concatenated in unit order.
///
/// # Errors
///
/// Returns [`ScanError::FetchFailure`] for the first unit whose query fails.
pub async fn fetch_logs<C, I>(
    client: &C,
    chain: Chain,
    contract: Address,
    units: I,
) -> Result<Vec<Log>, ScanError>
where
    C: ChainClient,
    I: IntoIterator<Item = FetchUnit>,
{
    let mut logs = Vec::new();

    for (i, unit) in units.into_iter().enumerate() {
        let found = client
            .get_logs(chain, LogQuery::deposits(contract, unit))
            .await
            .map_err(|source| ScanError::FetchFailure {
                from: unit.from,
                to: unit.to,
                source,
            })?;

        if !found.is_empty() {
            tracing::debug!(%chain, from = unit.from, to = unit.to, logs = found.len(), "logs found");
        }
        logs.extend(found);

        let done = i + 1;
        if done.is_multiple_of(PROGRESS_INTERVAL) {
            tracing::info!(%chain, units = done, block = unit.to, "fetching");
        }
    }

    Ok(logs)
}

/// Decode each log and stamp it with its block time, preserving order.
///
/// Block headers are requested once per distinct block; later logs from the
/// same block reuse the first answer.
///
/// # Errors
///
/// Returns [`ScanError::DecodeFailure`] for a log that is not a `Deposit`,
/// or [`ScanError::TimestampResolutionFailure`] if a block lookup fails.
pub async fn decode_events<C: ChainClient>(
    client: &C,
    chain: Chain,
    logs: &[Log],
) -> Result<Vec<DepositEvent>, ScanError> {
    let mut timestamps: BTreeMap<u64, DateTime<Utc>> = BTreeMap::new();
    let mut decoded = Vec::with_capacity(logs.len());

    for log in logs {
        // Reject foreign logs before any header request.
        let deposit = events::decode_deposit(log).map_err(|e| decode_failure(log, e))?;
        let block = log
            .block_number
            .ok_or_else(|| decode_failure(log, DecodeError::Pending("block number")))?;

        let timestamp = match timestamps.get(&block) {
            Some(ts) => *ts,
            None => {
                let ts = block_time(client, chain, block).await?;
                timestamps.insert(block, ts);
                ts
            }
        };

        let event = DepositEvent::from_deposit(chain, log, deposit, timestamp)
            .map_err(|e| decode_failure(log, e))?;
        decoded.push(event);
    }

    Ok(decoded)
}

async fn block_time<C: ChainClient>(
    client: &C,
    chain: Chain,
    block: u64,
) -> Result<DateTime<Utc>, ScanError> {
    let failure = |source| ScanError::TimestampResolutionFailure { block, source };

    let secs = client.get_block_timestamp(chain, block).await.map_err(failure)?;
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .ok_or_else(|| failure(ClientError::InvalidTimestamp(secs)))
}

fn decode_failure(log: &Log, source: DecodeError) -> ScanError {
    ScanError::DecodeFailure {
        tx: log
            .transaction_hash
            .map_or_else(|| "pending".to_owned(), |h| format!("{h:#x}")),
        source,
    }
}

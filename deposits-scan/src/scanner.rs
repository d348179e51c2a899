//! Scan orchestration.
//!
//! A scan walks `Idle → RangeResolved → Partitioned → Fetching → Decoding →
//! Done`, or drops to `Failed` on the first error. The sink is only reached
//! from `Decoding`, so a failed scan never writes partial output.

use std::fmt;

use alloy::primitives::Address;
use deposits::types::parse_address;
use deposits::{BlockRef, Chain, DepositEvent};

use crate::error::ScanError;
use crate::fetcher;
use crate::range::{self, PartitionPolicy, ResolvedRange};
use crate::rpc::ChainClient;
use crate::sink::Sink;

/// What to scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRequest {
    /// Chain to read from.
    pub chain: Chain,
    /// First block, inclusive.
    pub start: BlockRef,
    /// Last block, inclusive.
    pub end: BlockRef,
    /// Contract emitting `Deposit` events.
    pub contract: Address,
}

impl ScanRequest {
    /// Build a request from caller-supplied strings. No network I/O happens
    /// here, so an unsupported chain is rejected before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::UnsupportedChain`], [`ScanError::InvalidBlockRef`]
    /// or [`ScanError::InvalidAddress`].
    pub fn parse(chain: &str, start: &str, end: &str, contract: &str) -> Result<Self, ScanError> {
        Ok(Self {
            chain: chain.parse()?,
            start: start.parse()?,
            end: end.parse()?,
            contract: parse_address(contract)?,
        })
    }
}

/// Where a scan currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    /// Holding the raw request.
    #[default]
    Idle,
    /// Both bounds are concrete.
    RangeResolved,
    /// Fetch units computed.
    Partitioned,
    /// Querying logs unit by unit.
    Fetching,
    /// Decoding logs and resolving block times.
    Decoding,
    /// Result handed to the sink.
    Done,
    /// Aborted; nothing was persisted.
    Failed,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::RangeResolved => "range-resolved",
            Self::Partitioned => "partitioned",
            Self::Fetching => "fetching",
            Self::Decoding => "decoding",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Summary of a successful scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Chain that was scanned.
    pub chain: Chain,
    /// Range after `latest` resolution.
    pub range: ResolvedRange,
    /// Number of `eth_getLogs` requests issued.
    pub units: u64,
    /// Decoded events, in scan order.
    pub events: Vec<DepositEvent>,
}

/// Runs scans against a chain client and persists results to a sink.
///
/// One scan at a time per scanner; concurrent scans against the same chain
/// should each get their own client.
#[derive(Debug)]
pub struct Scanner<C, S> {
    client: C,
    sink: S,
    policy: PartitionPolicy,
    state: ScanState,
}

impl<C: ChainClient, S: Sink> Scanner<C, S> {
    /// Scanner using the legacy partition policy.
    pub fn new(client: C, sink: S) -> Self {
        Self {
            client,
            sink,
            policy: PartitionPolicy::default(),
            state: ScanState::Idle,
        }
    }

    /// Use `policy` to split ranges into fetch units.
    #[must_use]
    pub fn with_policy(mut self, policy: PartitionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// State reached by the most recent scan.
    #[must_use]
    pub const fn state(&self) -> ScanState {
        self.state
    }

    /// The chain client.
    #[must_use]
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// The sink.
    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Scan `request` and persist the result.
    ///
    /// # Errors
    ///
    /// Returns the first [`ScanError`] hit; the sink is not called in that
    /// case and the scanner ends in [`ScanState::Failed`].
    pub async fn scan(&mut self, request: &ScanRequest) -> Result<ScanReport, ScanError> {
        self.state = ScanState::Idle;
        tracing::info!(
            chain = %request.chain,
            start = %request.start,
            end = %request.end,
            contract = %request.contract,
            "scan requested"
        );

        match self.run(request).await {
            Ok(report) => Ok(report),
            Err(e) => {
                self.transition(ScanState::Failed);
                tracing::error!(chain = %request.chain, error = %e, retryable = e.is_retryable(), "scan failed");
                Err(e)
            }
        }
    }

    async fn run(&mut self, request: &ScanRequest) -> Result<ScanReport, ScanError> {
        let chain = request.chain;

        let range = range::resolve(&self.client, chain, request.start, request.end).await?;
        self.transition(ScanState::RangeResolved);
        if range.start == range.end {
            tracing::info!(%chain, block = range.start, "scanning block");
        } else {
            tracing::info!(%chain, from = range.start, to = range.end, "scanning blocks");
        }

        let units = self.policy.partition(range);
        let unit_count = units.remaining();
        self.transition(ScanState::Partitioned);
        tracing::info!(%chain, units = unit_count, blocks = range.blocks(), policy = %self.policy, "range partitioned");

        self.transition(ScanState::Fetching);
        let logs = fetcher::fetch_logs(&self.client, chain, request.contract, units).await?;

        self.transition(ScanState::Decoding);
        let events = fetcher::decode_events(&self.client, chain, &logs).await?;

        self.sink.persist(&events)?;
        self.transition(ScanState::Done);
        tracing::info!(%chain, events = events.len(), "scan complete");

        Ok(ScanReport {
            chain,
            range,
            units: unit_count,
            events,
        })
    }

    fn transition(&mut self, next: ScanState) {
        tracing::debug!(from = %self.state, to = %next, "scan state");
        self.state = next;
    }
}

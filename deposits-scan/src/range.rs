//! Range resolution and partitioning into fetch units.
//!
//! A request names its bounds as block numbers or `latest`. Resolution reads
//! the chain height once per `latest` bound, so two `latest` bounds may land
//! on different heights if a block is produced between the reads. That race
//! is part of the contract: callers needing a fixed window must pass numbers.

use std::fmt;
use std::num::NonZeroU64;

use deposits::{BlockRef, Chain};

use crate::error::ScanError;
use crate::rpc::ChainClient;

/// Width below which the legacy policy issues a single request for the whole
/// range.
pub const MAX_UNIT_SIZE: u64 = 30;

/// A range with both bounds concrete and `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    /// First block, inclusive.
    pub start: u64,
    /// Last block, inclusive.
    pub end: u64,
}

impl ResolvedRange {
    /// Validate concrete bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidRange`] if `end < start`.
    pub fn new(start: u64, end: u64) -> Result<Self, ScanError> {
        if end < start {
            return Err(ScanError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Number of blocks covered, saturating at `u64::MAX` for the full
    /// `0..=u64::MAX` range.
    #[must_use]
    pub const fn blocks(self) -> u64 {
        (self.end - self.start).saturating_add(1)
    }
}

impl fmt::Display for ResolvedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A contiguous block sub-range queried in a single `eth_getLogs` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchUnit {
    /// First block, inclusive.
    pub from: u64,
    /// Last block, inclusive.
    pub to: u64,
}

impl FetchUnit {
    /// A unit covering exactly one block.
    #[must_use]
    pub const fn block(number: u64) -> Self {
        Self {
            from: number,
            to: number,
        }
    }
}

/// How a resolved range is split into fetch units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartitionPolicy {
    /// One unit for ranges narrower than [`MAX_UNIT_SIZE`] blocks, otherwise
    /// one unit per block.
    ///
    /// Wide ranges cost one request per block with this policy. It is the
    /// default because its request pattern matches the established output
    /// of earlier scans exactly.
    #[default]
    Legacy,
    /// Contiguous windows of at most `n` blocks; the last one may be shorter.
    Window(NonZeroU64),
}

impl PartitionPolicy {
    /// Split `range` into units that tile it in ascending order with no gaps
    /// and no overlaps.
    ///
    /// Units are produced lazily, so a range of any width costs nothing until
    /// it is walked.
    #[must_use]
    pub const fn partition(self, range: ResolvedRange) -> Units {
        let width = match self {
            Self::Legacy if range.end - range.start < MAX_UNIT_SIZE => range.blocks(),
            Self::Legacy => 1,
            Self::Window(size) => size.get(),
        };
        Units {
            next: Some(range.start),
            end: range.end,
            width,
        }
    }
}

impl fmt::Display for PartitionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => f.write_str("legacy"),
            Self::Window(n) => write!(f, "window({n})"),
        }
    }
}

/// Fetch units of a resolved range, in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Units {
    next: Option<u64>,
    end: u64,
    width: u64,
}

impl Units {
    /// Units not yet yielded, saturating at `u64::MAX`.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        match self.next {
            Some(from) => ((self.end - from) / self.width).saturating_add(1),
            None => 0,
        }
    }
}

impl Iterator for Units {
    type Item = FetchUnit;

    fn next(&mut self) -> Option<FetchUnit> {
        let from = self.next?;
        let to = from.saturating_add(self.width - 1).min(self.end);
        self.next = (to < self.end).then(|| to + 1);
        Some(FetchUnit { from, to })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let exact = self
            .next
            .map_or(0, |from| u128::from((self.end - from) / self.width) + 1);
        match usize::try_from(exact) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}

/// Replace `latest` bounds with the chain height and validate the result.
///
/// Each `latest` bound issues its own height read.
///
/// # Errors
///
/// Returns [`ScanError::HeightUnavailable`] if a height read fails, or
/// [`ScanError::InvalidRange`] if the resolved end precedes the start.
pub async fn resolve<C: ChainClient>(
    client: &C,
    chain: Chain,
    start: BlockRef,
    end: BlockRef,
) -> Result<ResolvedRange, ScanError> {
    let start = resolve_bound(client, chain, start).await?;
    let end = resolve_bound(client, chain, end).await?;
    ResolvedRange::new(start, end)
}

async fn resolve_bound<C: ChainClient>(
    client: &C,
    chain: Chain,
    bound: BlockRef,
) -> Result<u64, ScanError> {
    match bound {
        BlockRef::Number(n) => Ok(n),
        BlockRef::Latest => client
            .current_height(chain)
            .await
            .map_err(|source| ScanError::HeightUnavailable { chain, source }),
    }
}

//! Supported chains and their built-in RPC endpoints.
//!
//! The set is closed: a scan can only target a chain listed here, and an
//! unknown identifier is rejected before any network I/O happens.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::ParseError;

/// A chain the scanner can read `Deposit` events from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// Avalanche C-chain, Fuji testnet (chain ID 43113).
    Avax,
    /// BNB Smart Chain testnet (chain ID 97).
    Bsc,
}

impl Chain {
    /// All supported chains.
    pub const ALL: &[Self] = &[Self::Avax, Self::Bsc];

    /// The short identifier used on the command line, in config files and in
    /// the `chain` output column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Avax => "avax",
            Self::Bsc => "bsc",
        }
    }

    /// Returns the EIP-155 chain ID.
    #[must_use]
    pub const fn chain_id(self) -> u64 {
        match self {
            Self::Avax => 43113,
            Self::Bsc => 97,
        }
    }

    /// Suggested public RPC endpoint, used when no override is configured.
    #[must_use]
    pub const fn default_rpc(self) -> &'static str {
        match self {
            Self::Avax => "https://api.avax-test.network/ext/bc/C/rpc",
            Self::Bsc => "https://data-seed-prebsc-1-s1.binance.org:8545/",
        }
    }

    /// Whether block headers on this chain carry proof-of-authority style
    /// extensions (oversized `extraData`, extra header fields).
    ///
    /// Both chains need a block decoder that tolerates unknown fields.
    #[must_use]
    pub const fn is_poa(self) -> bool {
        match self {
            Self::Avax | Self::Bsc => true,
        }
    }

    /// Look up a [`Chain`] by its EIP-155 chain ID.
    #[must_use]
    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        Self::ALL.iter().find(|c| c.chain_id() == chain_id).copied()
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts the short identifier (`avax`) or the decimal chain ID (`43113`).
impl FromStr for Chain {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .or_else(|| s.parse().ok().and_then(Self::from_chain_id))
            .ok_or_else(|| ParseError::UnsupportedChain(s.to_owned()))
    }
}

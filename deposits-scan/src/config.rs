//! Runtime configuration loaded from `config.toml`.
//!
//! Provides per-chain RPC endpoint overrides, the output location, the time
//! zone of the `date` column and the partition policy. When no config file is
//! present the built-in defaults are used, including
//! [`deposits::Chain::default_rpc`] for endpoints.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use deposits::Chain;
use serde::Deserialize;

use crate::range::PartitionPolicy;
use crate::rpc::DEFAULT_REQUEST_TIMEOUT;
use crate::sink::{CsvSink, Zone};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Output CSV path.
    pub output: Option<PathBuf>,

    /// Time zone of the `date` column.
    #[serde(default)]
    pub timezone: Zone,

    /// Per-request RPC timeout in seconds.
    pub request_timeout_secs: Option<u64>,

    /// Fetch-unit width; absent selects the legacy policy.
    pub window: Option<NonZeroU64>,

    /// Per-chain RPC overrides, keyed by chain identifier (`avax`, `bsc`) or
    /// chain ID.
    #[serde(default)]
    pub chains: HashMap<String, ChainRpc>,
}

/// RPC endpoint for a single chain.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainRpc {
    /// JSON-RPC URL.
    pub rpc: String,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Returns [`Config::default`] if the file does not exist,
    /// allowing the binary to work without any config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// names a chain that is not supported.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid TOML or an unsupported chain key.
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        for key in config.chains.keys() {
            key.parse::<Chain>()?;
        }
        Ok(config)
    }

    /// The RPC URL for a chain, falling back to the built-in default.
    #[must_use]
    pub fn rpc_for(&self, chain: Chain) -> String {
        self.chains
            .iter()
            .find(|(key, _)| key.parse::<Chain>() == Ok(chain))
            .map_or_else(|| chain.default_rpc().to_owned(), |(_, c)| c.rpc.clone())
    }

    /// Output path, defaulting to [`CsvSink::DEFAULT_PATH`].
    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from(CsvSink::DEFAULT_PATH))
    }

    /// Per-request RPC timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout_secs
            .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_secs)
    }

    /// Partition policy selected by `window`.
    #[must_use]
    pub fn partition_policy(&self) -> PartitionPolicy {
        self.window.map_or(PartitionPolicy::Legacy, PartitionPolicy::Window)
    }
}

//! Chain RPC access: the capability surface the scanner depends on and its
//! alloy-backed implementation.

use std::collections::BTreeMap;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::time::Duration;

use alloy::network::AnyNetwork;
use alloy::primitives::{Address, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{BlockNumberOrTag, Filter, Log};
use alloy::sol_types::SolEvent;
use alloy::transports::{RpcError, TransportErrorKind, TransportResult};
use deposits::{Chain, Deposit};

use crate::range::FetchUnit;

/// Default per-request timeout for RPC calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure of a single RPC round trip.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The client was built without an endpoint for this chain.
    #[error("no RPC endpoint configured for {0}")]
    NoEndpoint(Chain),

    /// The configured endpoint is not a valid URL.
    #[error("invalid RPC URL {url}: {reason}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// No response within the per-request timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Transport or node error.
    #[error(transparent)]
    Rpc(#[from] RpcError<TransportErrorKind>),

    /// The node has no block at this height.
    #[error("block {0} not found")]
    BlockNotFound(u64),

    /// The block timestamp does not fit a civil datetime.
    #[error("block timestamp {0} is out of range")]
    InvalidTimestamp(u64),
}

/// An `eth_getLogs` query for one fetch unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogQuery {
    /// Emitting contract.
    pub contract: Address,
    /// `topic0` filter.
    pub signature: B256,
    /// First block, inclusive.
    pub from: u64,
    /// Last block, inclusive.
    pub to: u64,
}

impl LogQuery {
    /// Query for `Deposit` logs emitted by `contract` within `unit`.
    #[must_use]
    pub const fn deposits(contract: Address, unit: FetchUnit) -> Self {
        Self {
            contract,
            signature: Deposit::SIGNATURE_HASH,
            from: unit.from,
            to: unit.to,
        }
    }

    fn to_filter(self) -> Filter {
        Filter::new()
            .address(self.contract)
            .event_signature(self.signature)
            .from_block(self.from)
            .to_block(self.to)
    }
}

/// What the scanner needs from a chain node.
///
/// Implementations are not expected to retry; a failed call fails the scan.
pub trait ChainClient {
    /// Current block height of `chain`.
    fn current_height(&self, chain: Chain)
    -> impl Future<Output = Result<u64, ClientError>> + Send;

    /// Logs matching `query`, in the order the node returns them.
    fn get_logs(
        &self,
        chain: Chain,
        query: LogQuery,
    ) -> impl Future<Output = Result<Vec<Log>, ClientError>> + Send;

    /// Unix timestamp (seconds) of block `number`.
    fn get_block_timestamp(
        &self,
        chain: Chain,
        number: u64,
    ) -> impl Future<Output = Result<u64, ClientError>> + Send;
}

/// HTTP JSON-RPC client with one provider per configured chain.
///
/// Providers use [`AnyNetwork`] so block responses from proof-of-authority
/// chains (long `extraData`, extra header fields, foreign tx types) decode
/// without a dedicated middleware.
#[derive(Clone)]
pub struct RpcClient {
    providers: BTreeMap<Chain, DynProvider<AnyNetwork>>,
    timeout: Duration,
}

impl fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient")
            .field("chains", &self.providers.keys().collect::<Vec<_>>())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RpcClient {
    /// Build providers for each `(chain, url)` endpoint.
    ///
    /// No network I/O happens here; a bad endpoint surfaces on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] if an endpoint does not parse.
    pub fn connect<I, U>(endpoints: I, timeout: Duration) -> Result<Self, ClientError>
    where
        I: IntoIterator<Item = (Chain, U)>,
        U: AsRef<str>,
    {
        let mut providers = BTreeMap::new();
        for (chain, url) in endpoints {
            let url = url.as_ref();
            let provider = ProviderBuilder::new()
                .network::<AnyNetwork>()
                .connect_http(url.parse().map_err(|e| ClientError::InvalidUrl {
                    url: url.to_owned(),
                    reason: format!("{e}"),
                })?)
                .erased();
            tracing::debug!(%chain, rpc = url, "provider ready");
            providers.insert(chain, provider);
        }
        Ok(Self { providers, timeout })
    }

    fn provider(&self, chain: Chain) -> Result<&DynProvider<AnyNetwork>, ClientError> {
        self.providers
            .get(&chain)
            .ok_or(ClientError::NoEndpoint(chain))
    }

    async fn request<F, T>(&self, call: F) -> Result<T, ClientError>
    where
        F: IntoFuture<Output = TransportResult<T>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| ClientError::Timeout(self.timeout))?
            .map_err(ClientError::from)
    }
}

impl ChainClient for RpcClient {
    async fn current_height(&self, chain: Chain) -> Result<u64, ClientError> {
        let provider = self.provider(chain)?;
        self.request(provider.get_block_number()).await
    }

    async fn get_logs(&self, chain: Chain, query: LogQuery) -> Result<Vec<Log>, ClientError> {
        let provider = self.provider(chain)?;
        let filter = query.to_filter();
        self.request(provider.get_logs(&filter)).await
    }

    async fn get_block_timestamp(&self, chain: Chain, number: u64) -> Result<u64, ClientError> {
        let provider = self.provider(chain)?;
        let block = self
            .request(provider.get_block_by_number(BlockNumberOrTag::Number(number)))
            .await?
            .ok_or(ClientError::BlockNotFound(number))?;
        Ok(block.header.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_query_targets_fetch_unit() {
        let contract = Address::repeat_byte(0xab);
        let query = LogQuery::deposits(contract, FetchUnit { from: 100, to: 110 });
        assert_eq!(query.signature, Deposit::SIGNATURE_HASH, "topic0 is Deposit");
        assert_eq!((query.from, query.to), (100, 110), "bounds copied");
    }

    #[tokio::test]
    async fn missing_endpoint_fails_without_io() {
        let client = RpcClient::connect([(Chain::Avax, Chain::Avax.default_rpc())], DEFAULT_REQUEST_TIMEOUT)
            .unwrap();
        assert!(
            matches!(client.current_height(Chain::Bsc).await, Err(ClientError::NoEndpoint(Chain::Bsc))),
            "bsc was never configured"
        );
    }

    #[tokio::test]
    async fn silent_node_times_out() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let timeout = Duration::from_millis(200);
        let client = RpcClient::connect([(Chain::Bsc, format!("http://{addr}"))], timeout).unwrap();

        let err = client.current_height(Chain::Bsc).await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout(t) if t == timeout), "{err}");
        let err = client.get_block_timestamp(Chain::Bsc, 105).await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout(_)), "{err}");
        server.abort();
    }

    #[test]
    fn rejects_malformed_url() {
        let err = RpcClient::connect([(Chain::Bsc, "not a url")], DEFAULT_REQUEST_TIMEOUT).unwrap_err();
        assert!(matches!(err, ClientError::InvalidUrl { .. }), "{err}");
    }
}

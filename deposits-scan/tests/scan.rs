//! End-to-end scans against a fixture chain.

use std::collections::BTreeMap;
use std::num::NonZeroU64;
use std::sync::Mutex;

use alloy::primitives::{Address, B256, U256, address};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use deposits::{BlockRef, Chain, Deposit, DepositEvent};
use deposits_scan::range::PartitionPolicy;
use deposits_scan::rpc::{ChainClient, ClientError, LogQuery};
use deposits_scan::sink::{Sink, SinkError, Zone, write_csv};
use deposits_scan::{ScanError, ScanRequest, ScanState, Scanner};

const CONTRACT: Address = address!("0000000000000000000000000000000000000abc");
const TOKEN: Address = address!("00000000000000000000000000000000000000f1");
const RECIPIENT: Address = address!("00000000000000000000000000000000000000e1");

/// In-memory chain: fixed height, logs by block, block timestamps.
#[derive(Default)]
struct FixtureChain {
    height: u64,
    logs: BTreeMap<u64, Vec<Log>>,
    timestamps: BTreeMap<u64, u64>,
    fail_logs_at: Option<u64>,
    height_down: bool,
    queries: Mutex<Vec<LogQuery>>,
}

impl FixtureChain {
    fn with_deposit(mut self, block: u64, amount: u64, timestamp: u64) -> Self {
        let log = Log {
            inner: alloy::primitives::Log {
                address: CONTRACT,
                data: Deposit {
                    token: TOKEN,
                    recipient: RECIPIENT,
                    amount: U256::from(amount),
                }
                .encode_log_data(),
            },
            block_number: Some(block),
            transaction_hash: Some(B256::left_padding_from(&block.to_be_bytes())),
            log_index: Some(0),
            ..Default::default()
        };
        self.logs.entry(block).or_default().push(log);
        self.timestamps.insert(block, timestamp);
        self
    }

    fn queries(&self) -> Vec<LogQuery> {
        self.queries.lock().unwrap().clone()
    }
}

impl ChainClient for FixtureChain {
    async fn current_height(&self, _chain: Chain) -> Result<u64, ClientError> {
        if self.height_down {
            return Err(ClientError::Timeout(std::time::Duration::from_secs(30)));
        }
        Ok(self.height)
    }

    async fn get_logs(&self, _chain: Chain, query: LogQuery) -> Result<Vec<Log>, ClientError> {
        self.queries.lock().unwrap().push(query);
        if self.fail_logs_at.is_some_and(|b| (query.from..=query.to).contains(&b)) {
            return Err(ClientError::Timeout(std::time::Duration::from_secs(30)));
        }
        Ok(self
            .logs
            .range(query.from..=query.to)
            .flat_map(|(_, logs)| logs.iter().cloned())
            .filter(|log| log.address() == query.contract)
            .collect())
    }

    async fn get_block_timestamp(&self, _chain: Chain, number: u64) -> Result<u64, ClientError> {
        self.timestamps
            .get(&number)
            .copied()
            .ok_or(ClientError::BlockNotFound(number))
    }
}

/// Keeps every persisted batch.
#[derive(Debug, Default)]
struct RecordingSink {
    writes: Vec<Vec<DepositEvent>>,
}

impl Sink for RecordingSink {
    fn persist(&mut self, events: &[DepositEvent]) -> Result<(), SinkError> {
        self.writes.push(events.to_vec());
        Ok(())
    }
}

fn request(start: u64, end: u64) -> ScanRequest {
    ScanRequest {
        chain: Chain::Avax,
        start: BlockRef::Number(start),
        end: BlockRef::Number(end),
        contract: CONTRACT,
    }
}

#[tokio::test]
async fn small_range_is_one_request_with_one_event() {
    let chain = FixtureChain::default().with_deposit(105, 1000, 1_700_000_000);
    let mut scanner = Scanner::new(chain, RecordingSink::default());

    let report = scanner.scan(&request(100, 110)).await.unwrap();

    assert_eq!(scanner.state(), ScanState::Done, "scan completes");
    assert_eq!(report.units, 1, "single fetch unit");
    let queries = scanner.client().queries();
    assert_eq!((queries[0].from, queries[0].to), (100, 110), "unit covers the range");

    assert_eq!(report.events.len(), 1, "one deposit");
    let event = &report.events[0];
    assert_eq!(event.token, TOKEN, "token");
    assert_eq!(event.recipient, RECIPIENT, "recipient");
    assert_eq!(event.amount, U256::from(1000), "amount");
    assert_eq!(event.contract_address, CONTRACT, "emitter");
    assert_eq!(event.unix_timestamp(), 1_700_000_000, "block time");
    assert_eq!(Zone::Utc.format(event.timestamp), "2023-11-14 22:13:20", "date string");

    assert_eq!(scanner.sink().writes, vec![report.events.clone()], "persisted once");
}

#[tokio::test]
async fn wide_range_is_one_request_per_block() {
    let chain = FixtureChain::default().with_deposit(130, 5, 1_700_000_130);
    let mut scanner = Scanner::new(chain, RecordingSink::default());

    let report = scanner.scan(&request(100, 140)).await.unwrap();

    assert_eq!(report.units, 41, "41 single-block units");
    let queries = scanner.client().queries();
    let blocks: Vec<_> = queries.iter().map(|q| (q.from, q.to)).collect();
    let expected: Vec<_> = (100..=140).map(|b| (b, b)).collect();
    assert_eq!(blocks, expected, "ascending, one block each");
    assert_eq!(report.events.len(), 1, "only block 130 has a deposit");
    assert_eq!(report.events[0].block_number, 130, "found at 130");
}

#[tokio::test]
async fn window_policy_batches_wide_ranges() {
    let chain = FixtureChain::default().with_deposit(130, 5, 1_700_000_130);
    let policy = PartitionPolicy::Window(NonZeroU64::new(20).unwrap());
    let mut scanner = Scanner::new(chain, RecordingSink::default()).with_policy(policy);

    let report = scanner.scan(&request(100, 140)).await.unwrap();

    assert_eq!(report.units, 3, "100-119, 120-139, 140-140");
    assert_eq!(report.events.len(), 1, "same result as legacy");
}

#[tokio::test]
async fn reversed_range_fails_without_sink_write() {
    let mut scanner = Scanner::new(FixtureChain::default(), RecordingSink::default());

    let err = scanner.scan(&request(50, 20)).await.unwrap_err();

    assert!(matches!(err, ScanError::InvalidRange { start: 50, end: 20 }), "{err}");
    assert!(!err.is_retryable(), "caller should not retry");
    assert_eq!(scanner.state(), ScanState::Failed, "terminal failure");
    assert!(scanner.client().queries().is_empty(), "no log queries");
    assert!(scanner.sink().writes.is_empty(), "nothing persisted");
}

#[tokio::test]
async fn empty_range_still_persists_header_only_result() {
    let mut scanner = Scanner::new(FixtureChain::default(), RecordingSink::default());

    let report = scanner.scan(&request(100, 110)).await.unwrap();

    assert_eq!(scanner.state(), ScanState::Done, "absence of events is not an error");
    assert!(report.events.is_empty(), "no events");
    assert_eq!(scanner.sink().writes, vec![Vec::new()], "one empty write");

    let mut csv = Vec::new();
    write_csv(&mut csv, &scanner.sink().writes[0], Zone::Utc).unwrap();
    assert_eq!(
        String::from_utf8(csv).unwrap(),
        "chain,token,recipient,amount,transactionHash,address,date\n",
        "header-only artifact"
    );
}

#[tokio::test]
async fn rescanning_unchanged_chain_is_idempotent() {
    let chain = FixtureChain::default()
        .with_deposit(101, 1, 1_700_000_001)
        .with_deposit(101, 2, 1_700_000_001)
        .with_deposit(108, 3, 1_700_000_008);
    let mut scanner = Scanner::new(chain, RecordingSink::default());

    let first = scanner.scan(&request(100, 110)).await.unwrap();
    let second = scanner.scan(&request(100, 110)).await.unwrap();

    assert_eq!(first, second, "same events, same order");
    let amounts: Vec<_> = first.events.iter().map(|e| e.amount.to::<u64>()).collect();
    assert_eq!(amounts, vec![1, 2, 3], "node order within block, blocks ascending");
}

#[tokio::test]
async fn latest_bounds_resolve_to_chain_height() {
    let chain = FixtureChain {
        height: 120,
        ..FixtureChain::default()
    }
    .with_deposit(119, 7, 1_700_000_119);
    let mut scanner = Scanner::new(chain, RecordingSink::default());
    let req = ScanRequest {
        start: BlockRef::Number(110),
        end: BlockRef::Latest,
        ..request(0, 0)
    };

    let report = scanner.scan(&req).await.unwrap();

    assert_eq!((report.range.start, report.range.end), (110, 120), "end resolved to height");
    assert_eq!(report.events.len(), 1, "deposit at 119 found");
}

#[tokio::test]
async fn unreadable_height_aborts_latest_scan() {
    let chain = FixtureChain {
        height_down: true,
        ..FixtureChain::default()
    }
    .with_deposit(105, 1, 1_700_000_105);
    let mut scanner = Scanner::new(chain, RecordingSink::default());
    let req = ScanRequest {
        end: BlockRef::Latest,
        ..request(100, 0)
    };

    let err = scanner.scan(&req).await.unwrap_err();

    assert!(
        matches!(
            err,
            ScanError::HeightUnavailable { chain: Chain::Avax, source: ClientError::Timeout(_) }
        ),
        "{err}"
    );
    assert!(err.is_retryable(), "node may answer next time");
    assert_eq!(scanner.state(), ScanState::Failed, "failed");
    assert!(scanner.client().queries().is_empty(), "no log queries");
    assert!(scanner.sink().writes.is_empty(), "nothing persisted");
}

#[tokio::test]
async fn fetch_failure_aborts_scan() {
    let chain = FixtureChain {
        fail_logs_at: Some(125),
        ..FixtureChain::default()
    }
    .with_deposit(105, 1, 1_700_000_105);
    let mut scanner = Scanner::new(chain, RecordingSink::default());

    let err = scanner.scan(&request(100, 140)).await.unwrap_err();

    assert!(matches!(err, ScanError::FetchFailure { from: 125, to: 125, .. }), "{err}");
    assert!(err.is_retryable(), "transport failures may be retried by the caller");
    assert_eq!(scanner.state(), ScanState::Failed, "failed");
    assert_eq!(scanner.client().queries().len(), 26, "stopped at the failing unit");
    assert!(scanner.sink().writes.is_empty(), "no partial output");
}

#[tokio::test]
async fn missing_block_header_aborts_scan() {
    let mut chain = FixtureChain::default().with_deposit(105, 1, 1_700_000_105);
    chain.timestamps.clear();
    let mut scanner = Scanner::new(chain, RecordingSink::default());

    let err = scanner.scan(&request(100, 110)).await.unwrap_err();

    assert!(
        matches!(
            err,
            ScanError::TimestampResolutionFailure { block: 105, source: ClientError::BlockNotFound(105) }
        ),
        "{err}"
    );
    assert!(scanner.sink().writes.is_empty(), "no event without a timestamp");
}

#[tokio::test]
async fn malformed_log_aborts_scan() {
    let mut chain = FixtureChain::default().with_deposit(105, 1, 1_700_000_105);
    if let Some(log) = chain.logs.get_mut(&105).and_then(|logs| logs.first_mut()) {
        let topics = log.topics()[..2].to_vec();
        log.inner.data = alloy::primitives::LogData::new_unchecked(topics, log.data().data.clone());
    }
    let mut scanner = Scanner::new(chain, RecordingSink::default());

    let err = scanner.scan(&request(100, 110)).await.unwrap_err();

    assert!(matches!(err, ScanError::DecodeFailure { .. }), "{err}");
    assert!(!err.is_retryable(), "the log will not change");
    assert!(scanner.sink().writes.is_empty(), "nothing persisted");
}

#[test]
fn unsupported_chain_fails_before_io() {
    let err = ScanRequest::parse("eth", "1", "2", "0x0000000000000000000000000000000000000abc")
        .unwrap_err();
    assert!(matches!(err, ScanError::UnsupportedChain(ref c) if c == "eth"), "{err}");
}

#[tokio::test]
async fn failed_scan_can_be_followed_by_successful_one() {
    let chain = FixtureChain::default().with_deposit(105, 1, 1_700_000_105);
    let mut scanner = Scanner::new(chain, RecordingSink::default());

    assert!(scanner.scan(&request(10, 5)).await.is_err(), "first scan fails");
    let report = scanner.scan(&request(100, 110)).await.unwrap();

    assert_eq!(scanner.state(), ScanState::Done, "state reset per scan");
    assert_eq!(report.events.len(), 1, "second scan succeeds");
    assert_eq!(scanner.sink().writes.len(), 1, "only the good scan persisted");
}

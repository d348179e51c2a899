//! Bridge `Deposit` event scanner CLI.
//!
//! Reads `Deposit` events emitted by a contract over a block range and writes
//! them to a CSV file.
//!
//! # Usage
//!
//! ```bash
//! # Scan a fixed range on the BSC testnet
//! deposits-scan scan --chain bsc --start 100 --end 110 --contract 0x...
//!
//! # Scan up to the chain tip with a custom RPC endpoint
//! deposits-scan scan --chain avax --start 3000000 --end latest \
//!     --contract 0x... --rpc https://my-rpc.example.com
//!
//! # Render dates in the host's local time zone
//! deposits-scan scan --chain avax --start latest --end latest \
//!     --contract 0x... --timezone local
//!
//! # List supported chains
//! deposits-scan list
//! ```

use std::num::NonZeroU64;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deposits::Chain;
use deposits_scan::config::Config;
use deposits_scan::range::PartitionPolicy;
use deposits_scan::rpc::RpcClient;
use deposits_scan::sink::{CsvSink, Zone};
use deposits_scan::{ScanRequest, Scanner};

/// Bridge `Deposit` event scanner.
#[derive(Debug, Parser)]
#[command(name = "deposits-scan", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Scan a block range and write all `Deposit` events to CSV.
    Scan {
        /// Chain identifier (see `list`).
        #[arg(long)]
        chain: String,

        /// First block to scan, or `latest`.
        #[arg(long)]
        start: String,

        /// Last block to scan, or `latest`.
        #[arg(long)]
        end: String,

        /// Address of the contract emitting `Deposit` events.
        #[arg(long)]
        contract: String,

        /// Configuration file.
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,

        /// Override the RPC endpoint for the target chain.
        #[arg(long)]
        rpc: Option<String>,

        /// Override the output CSV path.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Time zone of the `date` column.
        #[arg(long, value_enum)]
        timezone: Option<Zone>,

        /// Fetch fixed windows of N blocks instead of the legacy policy.
        #[arg(long)]
        window: Option<NonZeroU64>,
    },

    /// List supported chains.
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Scan {
            chain,
            start,
            end,
            contract,
            config,
            rpc,
            output,
            timezone,
            window,
        } => {
            let request = ScanRequest::parse(&chain, &start, &end, &contract)?;
            let overrides = Overrides {
                rpc,
                output,
                timezone,
                window,
            };
            cmd_scan(&request, &config, overrides).await
        }
        Command::List => {
            cmd_list();
            Ok(())
        }
    }
}

/// CLI values that take precedence over the config file.
#[derive(Debug)]
struct Overrides {
    rpc: Option<String>,
    output: Option<PathBuf>,
    timezone: Option<Zone>,
    window: Option<NonZeroU64>,
}

/// Execute the `scan` subcommand.
async fn cmd_scan(request: &ScanRequest, config_path: &Path, overrides: Overrides) -> Result<()> {
    let config = Config::load(config_path)?;

    let rpc = overrides.rpc.unwrap_or_else(|| config.rpc_for(request.chain));
    let output = overrides.output.unwrap_or_else(|| config.output_path());
    let zone = overrides.timezone.unwrap_or(config.timezone);
    let policy = overrides
        .window
        .map_or_else(|| config.partition_policy(), PartitionPolicy::Window);

    tracing::info!(
        chain = %request.chain,
        rpc = %rpc,
        output = %output.display(),
        "starting scan"
    );

    let client = RpcClient::connect([(request.chain, rpc.as_str())], config.request_timeout())
        .with_context(|| format!("connecting to {rpc}"))?;
    let sink = CsvSink::new(output, zone);

    let mut scanner = Scanner::new(client, sink).with_policy(policy);
    let report = scanner.scan(request).await?;

    tracing::info!(
        chain = %report.chain,
        from = report.range.start,
        to = report.range.end,
        requests = report.units,
        events = report.events.len(),
        path = %scanner.sink().path().display(),
        "scan finished"
    );
    Ok(())
}

/// Execute the `list` subcommand.
#[allow(clippy::print_stdout, reason = "listing is the command's output")]
fn cmd_list() {
    println!("{:<8} {:<10} {:<5} RPC", "Chain", "Chain ID", "POA");
    println!("{}", "-".repeat(72));

    for chain in Chain::ALL {
        println!(
            "{:<8} {:<10} {:<5} {}",
            chain.as_str(),
            chain.chain_id(),
            if chain.is_poa() { "yes" } else { "no" },
            chain.default_rpc(),
        );
    }
}

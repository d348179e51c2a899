//! Output of scan results.
//!
//! The CSV layout is fixed: a header row, then one row per event in scan
//! order. The target file is replaced on every run.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use deposits::DepositEvent;
use serde::Deserialize;

/// Column names, in output order.
pub const HEADER: [&str; 7] = [
    "chain",
    "token",
    "recipient",
    "amount",
    "transactionHash",
    "address",
    "date",
];

/// `strftime` pattern of the `date` column.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Where a scan result goes once every event is decoded.
pub trait Sink {
    /// Persist the full, ordered result. Called exactly once per successful
    /// scan, also when `events` is empty.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the result could not be stored.
    fn persist(&mut self, events: &[DepositEvent]) -> Result<(), SinkError>;
}

/// Failure to store a scan result.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// File system error on the output path.
    #[error("writing {}: {source}", path.display())]
    Io {
        /// File being written.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// CSV encoding error.
    #[error("encoding CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Time zone used to render the `date` column.
///
/// `Local` depends on the host's zone settings, so two machines scanning the
/// same range can write different files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    /// Coordinated Universal Time.
    #[default]
    Utc,
    /// The process's local time zone.
    Local,
}

impl Zone {
    /// Render `ts` as `YYYY-MM-DD HH:MM:SS` in this zone.
    #[must_use]
    pub fn format(self, ts: DateTime<Utc>) -> String {
        match self {
            Self::Utc => ts.format(DATE_FORMAT).to_string(),
            Self::Local => ts.with_timezone(&Local).format(DATE_FORMAT).to_string(),
        }
    }
}

/// Write `events` as CSV, header first.
///
/// # Errors
///
/// Returns [`csv::Error`] if writing to `writer` fails.
pub fn write_csv<W: Write>(writer: W, events: &[DepositEvent], zone: Zone) -> Result<(), csv::Error> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(HEADER)?;
    for event in events {
        out.write_record([
            event.chain.to_string(),
            event.token.to_string(),
            event.recipient.to_string(),
            event.amount.to_string(),
            format!("{:#x}", event.transaction_hash),
            event.contract_address.to_string(),
            zone.format(event.timestamp),
        ])?;
    }
    out.flush()?;
    Ok(())
}

/// Writes the result to a CSV file, replacing it atomically.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
    zone: Zone,
}

impl CsvSink {
    /// Default output file, relative to the working directory.
    pub const DEFAULT_PATH: &str = "deposit_logs.csv";

    /// Sink writing to `path` with dates rendered in `zone`.
    pub fn new(path: impl Into<PathBuf>, zone: Zone) -> Self {
        Self {
            path: path.into(),
            zone,
        }
    }

    /// Target file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for CsvSink {
    fn persist(&mut self, events: &[DepositEvent]) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error(parent))?;
        }

        let tmp = self.path.with_extension("csv.tmp");
        let written = std::fs::File::create(&tmp)
            .map_err(io_error(&tmp))
            .and_then(|file| Ok(write_csv(file, events, self.zone)?))
            .and_then(|()| std::fs::rename(&tmp, &self.path).map_err(io_error(&self.path)));
        if let Err(e) = written {
            if let Err(cleanup) = std::fs::remove_file(&tmp) {
                tracing::warn!(path = %tmp.display(), error = %cleanup, "temp file left behind");
            }
            return Err(e);
        }

        tracing::info!(path = %self.path.display(), rows = events.len(), "results written");
        Ok(())
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SinkError {
    let path = path.to_path_buf();
    move |source| SinkError::Io { path, source }
}

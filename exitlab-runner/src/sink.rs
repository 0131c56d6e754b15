//! Result persistence.
//!
//! The driver hands every [`ResultRecord`] to a [`ResultSink`]. `CsvResultSink`
//! appends rows to a file (writing the header only when the file is new or
//! empty); `NullSink` drops them for dry runs.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::driver::ResultRecord;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("cannot open {path}: {message}")]
    Open { path: String, message: String },

    #[error("failed to write result row: {0}")]
    Write(String),
}

pub trait ResultSink: Send {
    fn write(&mut self, record: &ResultRecord) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Rows accepted so far.
    fn rows_written(&self) -> usize;
}

pub struct CsvResultSink {
    path: PathBuf,
    writer: csv::Writer<fs::File>,
    rows: usize,
}

impl CsvResultSink {
    /// Open `path` for appending, creating parent directories as needed.
    pub fn append(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        let open_err = |e: std::io::Error| SinkError::Open {
            path: path.display().to_string(),
            message: e.to_string(),
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(open_err)?;
            }
        }
        let has_rows = fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(open_err)?;
        let writer = csv::WriterBuilder::new()
            .has_headers(!has_rows)
            .from_writer(file);
        Ok(Self {
            path,
            writer,
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for CsvResultSink {
    fn write(&mut self, record: &ResultRecord) -> Result<(), SinkError> {
        self.writer
            .serialize(record)
            .map_err(|e| SinkError::Write(e.to_string()))?;
        self.rows += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer
            .flush()
            .map_err(|e| SinkError::Write(e.to_string()))
    }

    fn rows_written(&self) -> usize {
        self.rows
    }
}

/// Counts rows and discards them.
#[derive(Debug, Default)]
pub struct NullSink {
    rows: usize,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultSink for NullSink {
    fn write(&mut self, _record: &ResultRecord) -> Result<(), SinkError> {
        self.rows += 1;
        Ok(())
    }

    fn rows_written(&self) -> usize {
        self.rows
    }
}

/// Keeps rows in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<ResultRecord>,
}

impl ResultSink for MemorySink {
    fn write(&mut self, record: &ResultRecord) -> Result<(), SinkError> {
        self.records.push(record.clone());
        Ok(())
    }

    fn rows_written(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(instrument: &str, multiplier: Option<f64>) -> ResultRecord {
        ResultRecord {
            instrument_id: instrument.into(),
            chain: "solana".into(),
            caller_label: "alpha".into(),
            signal_timestamp: 1_700_000_000,
            config_id: "abc123".into(),
            status: if multiplier.is_some() { "completed" } else { "no_candles" }.into(),
            entry_price: multiplier.map(|_| 1.0),
            exit_price: multiplier,
            pnl_multiplier: multiplier,
            max_price_reached: multiplier,
            hold_duration_minutes: multiplier.map(|_| 15.0),
        }
    }

    #[test]
    fn csv_sink_writes_header_once_across_reopens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/results.csv");

        let mut sink = CsvResultSink::append(&path).unwrap();
        sink.write(&record("BONK", Some(1.4))).unwrap();
        sink.flush().unwrap();
        drop(sink);

        let mut sink = CsvResultSink::append(&path).unwrap();
        sink.write(&record("WIF", None)).unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.rows_written(), 1);
        drop(sink);

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("instrumentId,chain,callerLabel,signalTimestamp"));
        assert!(lines[0].contains("pnlMultiplier"));
        assert!(lines[0].contains("holdDurationMinutes"));
        assert!(lines[1].starts_with("BONK,solana,alpha,1700000000"));
        assert!(lines[2].contains("no_candles"));
    }

    #[test]
    fn csv_rows_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        let mut sink = CsvResultSink::append(&path).unwrap();
        sink.write(&record("BONK", Some(1.4))).unwrap();
        sink.write(&record("WIF", None)).unwrap();
        sink.flush().unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<ResultRecord> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows, vec![record("BONK", Some(1.4)), record("WIF", None)]);
    }

    #[test]
    fn null_sink_counts() {
        let mut sink = NullSink::new();
        sink.write(&record("BONK", Some(1.0))).unwrap();
        sink.write(&record("WIF", None)).unwrap();
        assert_eq!(sink.rows_written(), 2);
    }

    #[test]
    fn unwritable_path_is_open_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let err = CsvResultSink::append(blocker.join("results.csv")).err().unwrap();
        assert!(matches!(err, SinkError::Open { .. }));
    }
}

//! Trade signals and their CSV loader.
//!
//! Expected header: `instrument_id,chain,caller_label,timestamp,price`.
//! `timestamp` is unix seconds or RFC 3339; `price` may be empty.

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use exitlab_core::engine::SignalAnchor;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("cannot read signals from {path}: {message}")]
    Io { path: String, message: String },

    #[error("signal row {row}: {message}")]
    Row { row: usize, message: String },

    #[error("signal row {row}: unparseable timestamp '{value}'")]
    InvalidTimestamp { row: usize, value: String },

    #[error("signal row {row}: price must be positive, got {price}")]
    InvalidPrice { row: usize, price: f64 },
}

/// A call to trade one instrument at one moment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub instrument_id: String,
    pub chain: String,
    pub caller_label: String,
    /// Unix seconds.
    pub timestamp: i64,
    pub price: Option<f64>,
}

impl Signal {
    pub fn anchor(&self) -> SignalAnchor {
        SignalAnchor {
            timestamp: self.timestamp,
            price: self.price,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SignalRow {
    #[serde(alias = "instrument", alias = "token")]
    instrument_id: String,
    chain: String,
    #[serde(default, alias = "caller")]
    caller_label: String,
    #[serde(alias = "time", alias = "signal_timestamp")]
    timestamp: String,
    #[serde(default)]
    price: Option<f64>,
}

fn parse_timestamp(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<i64>() {
        return Some(secs);
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.timestamp())
}

/// Parse signals from any CSV reader. Row numbers in errors are 1-based and
/// exclude the header.
pub fn read_signals<R: Read>(reader: R) -> Result<Vec<Signal>, SignalError> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut signals = Vec::new();
    for (i, row) in csv.deserialize::<SignalRow>().enumerate() {
        let row_no = i + 1;
        let raw = row.map_err(|e| SignalError::Row {
            row: row_no,
            message: e.to_string(),
        })?;
        let timestamp =
            parse_timestamp(&raw.timestamp).ok_or_else(|| SignalError::InvalidTimestamp {
                row: row_no,
                value: raw.timestamp.clone(),
            })?;
        if let Some(price) = raw.price {
            if !(price.is_finite() && price > 0.0) {
                return Err(SignalError::InvalidPrice { row: row_no, price });
            }
        }
        signals.push(Signal {
            instrument_id: raw.instrument_id,
            chain: raw.chain,
            caller_label: raw.caller_label,
            timestamp,
            price: raw.price,
        });
    }
    Ok(signals)
}

pub fn load_signals(path: &Path) -> Result<Vec<Signal>, SignalError> {
    let file = std::fs::File::open(path).map_err(|e| SignalError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    read_signals(file)
}

/// Instrument allow-list plus an inclusive time window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalFilter {
    /// Empty means every instrument.
    pub instruments: Vec<String>,
    pub from: Option<i64>,
    pub to: Option<i64>,
}

impl SignalFilter {
    pub fn with_instruments(mut self, instruments: Vec<String>) -> Self {
        self.instruments = instruments;
        self
    }

    /// Whole-day UTC bounds: `from` at 00:00:00, `to` at 23:59:59.
    pub fn with_dates(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.from = from
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc().timestamp());
        self.to = to
            .and_then(|d| d.and_hms_opt(23, 59, 59))
            .map(|dt| dt.and_utc().timestamp());
        self
    }

    pub fn matches(&self, signal: &Signal) -> bool {
        let instrument_ok = self.instruments.is_empty()
            || self.instruments.iter().any(|i| i == &signal.instrument_id);
        let from_ok = self.from.map_or(true, |from| signal.timestamp >= from);
        let to_ok = self.to.map_or(true, |to| signal.timestamp <= to);
        instrument_ok && from_ok && to_ok
    }

    pub fn apply(&self, signals: Vec<Signal>) -> Vec<Signal> {
        signals.into_iter().filter(|s| self.matches(s)).collect()
    }
}

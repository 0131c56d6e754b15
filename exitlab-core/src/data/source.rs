//! Candle supply port and structured error types.
//!
//! The engine never fetches data itself. Collaborators implement
//! [`CandleSource`] (local cache, remote API, synthetic generator) and hand the
//! engine a complete, validated slice.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::Candle;

/// Candle interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[default]
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl Interval {
    pub const ALL: [Interval; 6] = [
        Self::OneMinute,
        Self::FiveMinutes,
        Self::FifteenMinutes,
        Self::OneHour,
        Self::FourHours,
        Self::OneDay,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::OneHour => "1h",
            Self::FourHours => "4h",
            Self::OneDay => "1d",
        }
    }

    pub fn seconds(self) -> i64 {
        match self {
            Self::OneMinute => 60,
            Self::FiveMinutes => 300,
            Self::FifteenMinutes => 900,
            Self::OneHour => 3_600,
            Self::FourHours => 14_400,
            Self::OneDay => 86_400,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| DataError::InvalidRequest(format!("unknown interval '{s}'")))
    }
}

/// What to fetch: one instrument on one chain, `[from, to]` in unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandleRequest {
    pub instrument_id: String,
    pub chain: String,
    pub interval: Interval,
    pub from: i64,
    pub to: i64,
}

impl CandleRequest {
    pub fn new(
        instrument_id: impl Into<String>,
        chain: impl Into<String>,
        interval: Interval,
        from: i64,
        to: i64,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            chain: chain.into(),
            interval,
            from,
            to,
        }
    }

    /// Short label for log lines.
    pub fn label(&self) -> String {
        format!("{}:{}@{}", self.chain, self.instrument_id, self.interval)
    }

    pub fn validate(&self) -> Result<(), DataError> {
        if self.instrument_id.trim().is_empty() {
            return Err(DataError::InvalidRequest("instrument id is empty".into()));
        }
        if self.from > self.to {
            return Err(DataError::InvalidRequest(format!(
                "range start {} is after range end {}",
                self.from, self.to
            )));
        }
        Ok(())
    }
}

/// Structured error types for candle supply.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("unexpected response: {0}")]
    ResponseFormat(String),

    #[error("instrument not found: {instrument}")]
    InstrumentNotFound { instrument: String },

    #[error("circuit breaker open: provider has failed repeatedly")]
    CircuitBreakerTripped,

    #[error("no cached candles for {label} (offline mode)")]
    NoCachedData { label: String },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("data error: {0}")]
    Other(String),
}

impl DataError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited { .. })
    }
}

/// Source of candles for one (instrument, chain, interval, range).
///
/// Returned candles must be time-ordered. Implementations that front a remote
/// API handle their own retries and rate limiting.
pub trait CandleSource: Send + Sync {
    fn name(&self) -> &str;

    fn fetch(&self, request: &CandleRequest) -> Result<Vec<Candle>, DataError>;

    /// False while the source is known to be unusable (e.g. circuit open).
    fn is_available(&self) -> bool {
        true
    }
}

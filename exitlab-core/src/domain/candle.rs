//! Candle: the fundamental market data unit.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OHLCV candle for one instrument over one interval.
///
/// `timestamp` is the candle open time in unix seconds. Sequences handed to the
/// engine are non-decreasing in `timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Returns true if any price field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }

    /// OHLC sanity check: low <= open,close <= high and strictly positive prices.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.low > 0.0
            && self.low <= self.high
            && self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high
            && self.volume >= 0.0
    }
}

/// Structural problems with a candle slice.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CandleError {
    #[error("candle sequence is empty")]
    Empty,

    #[error("candle {index} (t={timestamp}) violates low <= open,close <= high or has non-positive prices")]
    Inconsistent { index: usize, timestamp: i64 },

    #[error("candle {index} (t={timestamp}) is earlier than its predecessor (t={previous})")]
    OutOfOrder {
        index: usize,
        timestamp: i64,
        previous: i64,
    },
}

/// Check that a slice is non-empty, internally consistent, and time-ordered.
pub fn validate_candles(candles: &[Candle]) -> Result<(), CandleError> {
    if candles.is_empty() {
        return Err(CandleError::Empty);
    }
    let mut previous: Option<i64> = None;
    for (index, candle) in candles.iter().enumerate() {
        if !candle.is_sane() {
            return Err(CandleError::Inconsistent {
                index,
                timestamp: candle.timestamp,
            });
        }
        if let Some(prev) = previous {
            if candle.timestamp < prev {
                return Err(CandleError::OutOfOrder {
                    index,
                    timestamp: candle.timestamp,
                    previous: prev,
                });
            }
        }
        previous = Some(candle.timestamp);
    }
    Ok(())
}

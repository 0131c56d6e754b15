//! Technical indicators.
//!
//! Indicators are pure functions of candle history. A reading at index `i`
//! uses only candles strictly before `i`, so an entry decision on candle `i`
//! never sees that candle's own range.

pub mod cloud;

pub use cloud::{Cloud, CloudPeriods, CloudValues};

use crate::domain::Candle;

/// Result of evaluating an indicator at one index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading<T> {
    Ready(T),
    /// Not enough history before the index. Rules that depend on the
    /// indicator treat this as "does not fire".
    Insufficient { required: usize, available: usize },
}

impl<T> Reading<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(v) => Some(v),
            Self::Insufficient { .. } => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

pub trait Indicator: Send + Sync {
    type Value;

    /// Human-readable name (e.g., "cloud_9_26_52").
    fn name(&self) -> String;

    /// Number of candles required strictly before an index.
    fn lookback(&self) -> usize;

    fn at(&self, candles: &[Candle], index: usize) -> Reading<Self::Value>;

    /// Readings for every index of the series.
    fn compute(&self, candles: &[Candle]) -> Vec<Reading<Self::Value>> {
        (0..candles.len()).map(|i| self.at(candles, i)).collect()
    }
}

/// Build candles from closes: open = previous close, high/low one unit outside.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle::new(
                i as i64 * 60,
                open,
                open.max(close) + 1.0,
                open.min(close) - 1.0,
                close,
                1000.0,
            )
        })
        .collect()
}

#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

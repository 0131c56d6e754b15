//! Three-line cloud indicator (Ichimoku-style).
//!
//! For an index `i`, each line is the midpoint of the highest high and lowest
//! low over a window ending at `i - 1`:
//! - short line  (tenkan): short-period midpoint
//! - medium line (kijun):  medium-period midpoint
//! - span A: average of the short and medium lines
//! - span B: long-period midpoint
//!
//! Spans are read at the current index (no forward displacement). A reading
//! requires at least `long` candles strictly before the index.

use serde::{Deserialize, Serialize};

use super::{Indicator, Reading};
use crate::config::ConfigError;
use crate::domain::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudPeriods {
    pub short: usize,
    pub medium: usize,
    pub long: usize,
}

impl Default for CloudPeriods {
    fn default() -> Self {
        Self {
            short: 9,
            medium: 26,
            long: 52,
        }
    }
}

impl CloudPeriods {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.short == 0 || self.short > self.medium || self.medium > self.long {
            return Err(ConfigError::InvalidCloudPeriods {
                short: self.short,
                medium: self.medium,
                long: self.long,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CloudValues {
    pub tenkan: f64,
    pub kijun: f64,
    pub span_a: f64,
    pub span_b: f64,
}

impl CloudValues {
    pub fn cloud_top(&self) -> f64 {
        self.span_a.max(self.span_b)
    }

    /// Bullish breakout: close above the cloud with the short line above the medium line.
    pub fn is_bullish_breakout(&self, close: f64) -> bool {
        close > self.cloud_top() && self.tenkan > self.kijun
    }
}

#[derive(Debug, Clone)]
pub struct Cloud {
    periods: CloudPeriods,
}

impl Cloud {
    pub fn new(periods: CloudPeriods) -> Self {
        Self { periods }
    }
}

impl Default for Cloud {
    fn default() -> Self {
        Self::new(CloudPeriods::default())
    }
}

/// Midpoint of the range over `candles[end - period..end]`.
fn midpoint(candles: &[Candle], end: usize, period: usize) -> f64 {
    let window = &candles[end - period..end];
    let (hi, lo) = window
        .iter()
        .fold((f64::NEG_INFINITY, f64::INFINITY), |(hi, lo), c| {
            (hi.max(c.high), lo.min(c.low))
        });
    (hi + lo) / 2.0
}

impl Indicator for Cloud {
    type Value = CloudValues;

    fn name(&self) -> String {
        format!(
            "cloud_{}_{}_{}",
            self.periods.short, self.periods.medium, self.periods.long
        )
    }

    fn lookback(&self) -> usize {
        self.periods.long
    }

    fn at(&self, candles: &[Candle], index: usize) -> Reading<CloudValues> {
        let required = self.periods.long;
        let available = index.min(candles.len());
        if available < required || index >= candles.len() {
            return Reading::Insufficient {
                required,
                available,
            };
        }
        let tenkan = midpoint(candles, index, self.periods.short);
        let kijun = midpoint(candles, index, self.periods.medium);
        let span_b = midpoint(candles, index, self.periods.long);
        Reading::Ready(CloudValues {
            tenkan,
            kijun,
            span_a: (tenkan + kijun) / 2.0,
            span_b,
        })
    }
}

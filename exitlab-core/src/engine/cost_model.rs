//! Cost model: slippage, taker fees and borrow accrual.
//!
//! Slippage is directional: buys fill higher, sells fill lower. Fees are a
//! flat rate on the notional of each fill. Borrow cost accrues on the leg's
//! notional for the time it is held and is charged once, at close.
//!
//! Notional is expressed in units of original capital: a leg of size 0.5
//! entered at `e` and sold at `x` has exit notional `0.5 × x / e`.

use crate::config::CostConfig;

pub const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 3600.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    entry_slippage: f64,
    exit_slippage: f64,
    fee_rate: f64,
    borrow_apr: f64,
}

impl CostModel {
    pub fn from_config(config: &CostConfig) -> Self {
        Self {
            entry_slippage: config.entry_slippage_bps / 10_000.0,
            exit_slippage: config.exit_slippage_bps / 10_000.0,
            fee_rate: config.taker_fee_bps / 10_000.0,
            borrow_apr: config.borrow_apr_bps / 10_000.0,
        }
    }

    pub fn frictionless() -> Self {
        Self::from_config(&CostConfig::frictionless())
    }

    /// Realized fill price for a nominal price.
    pub fn fill_price(&self, nominal: f64, side: Side) -> f64 {
        match side {
            Side::Buy => nominal * (1.0 + self.entry_slippage),
            Side::Sell => nominal * (1.0 - self.exit_slippage),
        }
    }

    pub fn fee(&self, notional: f64) -> f64 {
        notional * self.fee_rate
    }

    /// Borrow cost for holding `notional` for `hold_secs`.
    pub fn borrow_cost(&self, notional: f64, hold_secs: i64) -> f64 {
        if self.borrow_apr == 0.0 || hold_secs <= 0 {
            return 0.0;
        }
        notional * self.borrow_apr * hold_secs as f64 / SECONDS_PER_YEAR
    }
}

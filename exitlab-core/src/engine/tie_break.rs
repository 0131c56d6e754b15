//! Intrabar tie-break: which trigger fires first when a candle's range
//! contains both the stop and at least one ladder target.

use crate::config::TieBreakPolicy;
use crate::domain::Candle;

/// Resolved order for one ambiguous candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrabarOrder {
    /// Stop fires; targets on this candle are ignored.
    StopFirst,
    /// Reachable targets fill, then the stop closes the remainder.
    TargetsFirst,
}

pub fn resolve(policy: TieBreakPolicy, candle: &Candle) -> IntrabarOrder {
    match policy {
        TieBreakPolicy::StopFirst => IntrabarOrder::StopFirst,
        TieBreakPolicy::TargetFirst => IntrabarOrder::TargetsFirst,
        TieBreakPolicy::OhlcPath => {
            // Open -> High -> Low -> Close when the open sits nearer the high.
            let high_first = (candle.open - candle.high).abs() <= (candle.open - candle.low).abs();
            if high_first {
                IntrabarOrder::TargetsFirst
            } else {
                IntrabarOrder::StopFirst
            }
        }
    }
}

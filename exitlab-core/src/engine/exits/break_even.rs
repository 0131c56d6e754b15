//! Break-even bailout.
//!
//! Once the position has been in profit and then gives back more than
//! `armed_drawdown_pct` of its peak, the stop moves up to the entry price.
//! Arming never closes anything by itself.

use super::{ExitSignal, StopSource};
use crate::config::BreakEvenBlock;
use crate::domain::{Candle, Position};

/// Checks the drawdown from the peak reached before this candle to this
/// candle's low.
pub fn check(candle: &Candle, position: &Position, block: &BreakEvenBlock) -> Option<ExitSignal> {
    if position.armed_break_even {
        return None;
    }
    let entry = position.nominal_entry_price;
    let peak = position.peak_price;
    if peak <= entry {
        return None;
    }
    let drawdown = (peak - candle.low) / peak;
    if drawdown < block.armed_drawdown_pct {
        return None;
    }
    Some(ExitSignal::MoveStop {
        to: entry,
        source: StopSource::BreakEven,
    })
}

//! Fixed and trailing stop.

use super::{ExitSignal, StopSource};
use crate::config::{GapPolicy, StopBlock, TrailingStop};
use crate::domain::{Candle, Position};

/// Initial stop level for a fresh leg.
pub fn initial_level(block: &StopBlock, nominal_entry: f64) -> f64 {
    nominal_entry * (1.0 - block.initial_pct)
}

/// Fires when the candle low reaches the stop in force at the start of the candle.
///
/// Under [`GapPolicy::FillAtOpen`] a candle that opens at or below the stop
/// fills at the open instead of the stop price.
pub fn check(candle: &Candle, position: &Position, gap: GapPolicy) -> Option<ExitSignal> {
    let stop = position.current_stop_price()?;
    if candle.low > stop {
        return None;
    }
    let nominal_price = match gap {
        GapPolicy::FillAtOpen if candle.open <= stop => candle.open,
        _ => stop,
    };
    Some(ExitSignal::StopLoss { nominal_price })
}

/// Proposes a trailing stop `trail_pct` below the high-water mark (including
/// this candle's high), once the high-water mark has reached the activation
/// multiple. Returns nothing unless the proposal is above the current stop.
pub fn trail(candle: &Candle, position: &Position, trailing: &TrailingStop) -> Option<ExitSignal> {
    let peak = position.peak_price.max(candle.high);
    let armed = position.trailing_armed
        || peak >= position.nominal_entry_price * trailing.activation_multiple;
    if !armed {
        return None;
    }
    let proposed = peak * (1.0 - trailing.trail_pct);
    match position.current_stop_price() {
        Some(current) if proposed <= current => None,
        _ => Some(ExitSignal::MoveStop {
            to: proposed,
            source: StopSource::Trailing,
        }),
    }
}

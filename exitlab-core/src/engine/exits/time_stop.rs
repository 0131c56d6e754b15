//! Time stop: close at the candle close once the hold exceeds the maximum.

use super::ExitSignal;
use crate::config::MaxHoldBlock;
use crate::domain::{Candle, Position};

pub fn check(candle: &Candle, position: &Position, block: &MaxHoldBlock) -> Option<ExitSignal> {
    let elapsed = candle.timestamp - position.entry_timestamp;
    if elapsed > block.seconds {
        Some(ExitSignal::TimeStop {
            nominal_price: candle.close,
        })
    } else {
        None
    }
}

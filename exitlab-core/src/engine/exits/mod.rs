//! Exit policy evaluators.
//!
//! Each evaluator is a pure function of (candle, position, block settings) and
//! returns at most one signal. Evaluators never mutate the position; the state
//! machine applies signals in priority order:
//!
//! 1. stop check against the candle low ([`stop::check`])
//! 2. stop movement: trailing ([`stop::trail`]) and break-even arming ([`break_even::check`])
//! 3. ladder targets against the candle high, ascending ([`ladder::next_fill`])
//! 4. elapsed-time check ([`time_stop::check`])

pub mod break_even;
pub mod ladder;
pub mod stop;
pub mod time_stop;

use serde::{Deserialize, Serialize};

/// Why a stop price moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopSource {
    Initial,
    Trailing,
    BreakEven,
}

impl StopSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial stop",
            Self::Trailing => "trailing stop",
            Self::BreakEven => "break-even stop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitSignal {
    /// Close everything at `nominal_price`.
    StopLoss { nominal_price: f64 },
    /// Raise the stop (takes effect from the next candle).
    MoveStop { to: f64, source: StopSource },
    /// Fill one ladder level.
    TargetHit {
        level: usize,
        nominal_price: f64,
        fraction: f64,
    },
    /// Close everything at the candle close.
    TimeStop { nominal_price: f64 },
}

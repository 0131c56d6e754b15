//! Simulation events: the auditable record of one run.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened at an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Entry,
    StopMoved,
    TargetHit,
    StopLoss,
    TimeStop,
    ReEntry,
    FinalExit,
}

impl EventKind {
    /// True for events that open a leg.
    pub fn opens_leg(self) -> bool {
        matches!(self, Self::Entry | Self::ReEntry)
    }

    /// True for events that close some fraction of the open leg.
    pub fn is_closing(self) -> bool {
        matches!(
            self,
            Self::TargetHit | Self::StopLoss | Self::TimeStop | Self::FinalExit
        )
    }

    /// True for events after which the leg is flat by construction.
    pub fn terminates_leg(self) -> bool {
        matches!(self, Self::StopLoss | Self::TimeStop | Self::FinalExit)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::StopMoved => "stop_moved",
            Self::TargetHit => "target_hit",
            Self::StopLoss => "stop_loss",
            Self::TimeStop => "time_stop",
            Self::ReEntry => "re_entry",
            Self::FinalExit => "final_exit",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in a run's event log.
///
/// Fractions are shares of the ORIGINAL position size (1.0), so a re-entry leg
/// sized at 0.5 opens with `fraction = 0.5`. For `StopMoved` events `price` is
/// the new stop price and `fraction` is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationEvent {
    pub kind: EventKind,
    pub timestamp: i64,
    /// Realized fill price after slippage.
    pub price: f64,
    /// Price before the cost model was applied.
    pub nominal_price: f64,
    /// Fraction opened (entries) or closed (exits).
    pub fraction: f64,
    /// Costs charged by this event, in units of original capital.
    pub fee: f64,
    /// 0 for the original position, 1.. for re-entry legs.
    pub leg: u32,
    /// Open fraction of the current leg after this event.
    pub remaining_after: f64,
    /// Net realized PnL so far, as a fraction of original capital
    /// (the run's multiplier is `1 + cumulative_pnl_after` once flat).
    pub cumulative_pnl_after: f64,
    pub description: String,
}

//! Fill-modelling policies: intrabar tie-break and gap handling.

use serde::{Deserialize, Serialize};

/// Intrabar tie-break policy.
///
/// A candle's high and low do not reveal which extreme printed first. When a
/// candle's range contains both the stop price and at least one ladder target,
/// this policy decides which fires first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreakPolicy {
    /// Adversarial: the stop fires first and the targets are ignored (default).
    #[default]
    StopFirst,
    /// Optimistic: reachable targets fill first, then the stop closes the rest.
    TargetFirst,
    /// Infer the path from OHLC: if the open is closer to the high, the high
    /// printed first (targets before stop); otherwise the low printed first.
    OhlcPath,
}

impl TieBreakPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StopFirst => "stop_first",
            Self::TargetFirst => "target_first",
            Self::OhlcPath => "ohlc_path",
        }
    }
}

/// Policy for stops the market gaps through at the open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Fill at the stop price regardless of the open (default). Keeps the
    /// armed break-even floor exact.
    #[default]
    FillAtTrigger,
    /// Fill at the open when it is already below the stop. An armed
    /// break-even stop can then close below entry.
    FillAtOpen,
}

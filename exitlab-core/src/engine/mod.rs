//! Simulation engine: exit evaluators, position state machine, re-entry and
//! PnL aggregation.
//!
//! A run is a pure function of (candles, compiled strategy, signal anchor):
//! no I/O, no clock, no randomness.

pub mod aggregate;
pub mod cost_model;
pub mod exits;
pub mod machine;
pub mod reentry;
pub mod tie_break;

pub use aggregate::{aggregate, PnlLedger, SimulationOutcome, SimulationResult, SkipReason};
pub use cost_model::{CostModel, Side};
pub use exits::{ExitSignal, StopSource};
pub use machine::{simulate, simulate_signal, SignalAnchor};
pub use reentry::{ReEntryCoordinator, ReEntryTrigger};
pub use tie_break::IntrabarOrder;

//! exitlab core: deterministic exit-strategy simulation.
//!
//! This crate contains the engine and everything it needs:
//! - Domain types (candles, positions, events, config IDs)
//! - Strategy configuration, validation and the composable exit plan
//! - Exit evaluators (fixed/trailing stop, break-even, ladder, time stop)
//! - Position state machine with a configurable intrabar tie-break
//! - Re-entry coordinator and PnL aggregation
//! - Cloud indicator for conditional entries
//! - The candle supply port implemented by collaborators
//!
//! Nothing here performs I/O or logging; a run is a pure function of its inputs.

pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod indicators;

pub use config::{CompiledStrategy, ConfigError, ExitPlan, StrategyConfig};
pub use domain::{Candle, ConfigId, EventKind, SimulationEvent};
pub use engine::{simulate, simulate_signal, SignalAnchor, SimulationOutcome, SimulationResult, SkipReason};
pub use error::SimError;

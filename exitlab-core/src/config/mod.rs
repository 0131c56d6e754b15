//! Strategy and exit-plan configuration.

pub mod error;
pub mod execution;
pub mod exit_plan;
pub mod strategy;

pub use error::ConfigError;
pub use execution::{GapPolicy, TieBreakPolicy};
pub use exit_plan::{
    BreakEvenBlock, ExitBlock, ExitPlan, LadderBlock, LadderLevel, MaxHoldBlock, StopBlock,
    TrailingStop,
};
pub use strategy::{
    CompiledStrategy, CostConfig, EntryRule, ReEntryConfig, StopLossConfig, StrategyConfig,
};

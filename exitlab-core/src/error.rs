use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::CandleError;

/// Errors that stop a simulation before any candle is processed.
///
/// Data shortfalls that are expected in batch runs (no candles after the
/// signal, not enough indicator history) are not errors; they come back as
/// [`crate::engine::SimulationOutcome::Skipped`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid candles: {0}")]
    Candles(#[from] CandleError),

    #[error("entry price must be finite and positive, got {0}")]
    InvalidEntryPrice(f64),
}

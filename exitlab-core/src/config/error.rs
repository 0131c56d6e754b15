use thiserror::Error;

/// Configuration errors, raised before any candle is processed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("stop-loss percentage must be in (0, 1), got {0}")]
    InvalidStopPct(f64),

    #[error("trailing stop needs trail_pct in (0, 1) and activation_multiple >= 1, got trail_pct={trail_pct}, activation_multiple={activation_multiple}")]
    InvalidTrailing {
        trail_pct: f64,
        activation_multiple: f64,
    },

    #[error("ladder level {index}: fraction must be in (0, 1], got {fraction}")]
    InvalidLadderFraction { index: usize, fraction: f64 },

    #[error("ladder level {index}: target multiple must be > 1, got {target_multiple}")]
    InvalidLadderTarget { index: usize, target_multiple: f64 },

    #[error("ladder fractions sum to {total}, which exceeds 1.0")]
    LadderOverallocated { total: f64 },

    #[error("target multiple must be > 1, got {0}")]
    InvalidTargetMultiple(f64),

    #[error("no exit target: configure at least one ladder level or a full-exit target multiple")]
    MissingExitTarget,

    #[error("break-even drawdown percentage must be in (0, 1), got {0}")]
    InvalidBreakEven(f64),

    #[error("max hold duration must be positive, got {0}s")]
    InvalidMaxHold(i64),

    #[error("invalid re-entry setting: {0}")]
    InvalidReEntry(String),

    #[error("cost parameter '{field}' must be finite and >= 0 (slippage < 10000 bps), got {value}")]
    InvalidCost { field: &'static str, value: f64 },

    #[error("cloud periods must satisfy 0 < short <= medium <= long, got {short}/{medium}/{long}")]
    InvalidCloudPeriods {
        short: usize,
        medium: usize,
        long: usize,
    },

    #[error("exit plan has more than one '{0}' block")]
    DuplicateBlock(&'static str),

    #[error("exit plan has no blocks")]
    EmptyExitPlan,

    #[error("unknown preset '{0}'")]
    UnknownPreset(String),
}

//! exitlab runner: everything around the engine that touches the outside world.
//!
//! This crate builds on `exitlab-core` to provide:
//! - Candle supply: CSV cache, rate-limited HTTP provider with a circuit
//!   breaker, cache-first composition, synthetic candles
//! - Signal loading and filtering
//! - Named strategy presets
//! - The simulation driver and result persistence
//! - Exit-plan grids and parallel sweeps with streaming summaries
//! - TOML run settings

pub mod cache;
pub mod circuit_breaker;
pub mod driver;
pub mod http;
pub mod presets;
pub mod settings;
pub mod signals;
pub mod sink;
pub mod source;
pub mod summary;
pub mod sweep;

pub use cache::CsvCandleCache;
pub use circuit_breaker::CircuitBreaker;
pub use driver::{
    simulate_prepared, Driver, DriverError, DriverOptions, PreparedSignal, ResultRecord,
    RunRecord, RunReport,
};
pub use http::{HttpCandleSource, HttpOptions};
pub use presets::PresetRegistry;
pub use settings::{Settings, SettingsError};
pub use signals::{load_signals, read_signals, Signal, SignalError, SignalFilter};
pub use sink::{CsvResultSink, MemorySink, NullSink, ResultSink, SinkError};
pub use source::{canonicalize, CachedCandleSource, SyntheticCandleSource};
pub use summary::PlanSummary;
pub use sweep::{
    CancellationToken, ExitPlanGrid, Sweep, SweepError, SweepOptions, SweepOutput, SweepRecord,
    SweepStatus,
};

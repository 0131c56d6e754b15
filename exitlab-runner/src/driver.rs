//! Simulation driver: signal → candles → engine → persisted row.
//!
//! The driver owns all I/O around a run. Candle fetch failures are logged and
//! counted per signal instead of aborting the batch; sink failures abort,
//! since results would otherwise be silently lost.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use exitlab_core::config::{CompiledStrategy, ConfigError, EntryRule};
use exitlab_core::data::{CandleRequest, CandleSource, DataError, Interval};
use exitlab_core::domain::{Candle, ConfigId};
use exitlab_core::engine::{simulate_signal, SimulationOutcome, SkipReason};
use exitlab_core::indicators::{Cloud, Indicator};
use exitlab_core::SimError;

use crate::signals::{Signal, SignalError};
use crate::sink::{ResultSink, SinkError};
use crate::summary::PlanSummary;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("candles unavailable for {label}: {source}")]
    Data {
        label: String,
        #[source]
        source: DataError,
    },

    #[error("simulation failed for {instrument}: {source}")]
    Simulation {
        instrument: String,
        #[source]
        source: SimError,
    },

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Signals(#[from] SignalError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no signals match the instrument/date filter")]
    NoMatchingSignals,
}

/// Candle window around each signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverOptions {
    pub interval: Interval,
    /// Candles fetched before the signal as indicator history. Raised
    /// automatically to whatever the entry rule needs.
    pub warmup_candles: usize,
    /// How long after the signal to follow the trade.
    pub horizon_secs: i64,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            interval: Interval::FiveMinutes,
            warmup_candles: 0,
            horizon_secs: 24 * 60 * 60,
        }
    }
}

/// One simulated signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub signal: Signal,
    pub config_id: ConfigId,
    pub outcome: SimulationOutcome,
}

/// Flat row persisted per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub instrument_id: String,
    pub chain: String,
    pub caller_label: String,
    pub signal_timestamp: i64,
    pub config_id: String,
    /// `completed` or the skip reason code.
    pub status: String,
    pub entry_price: Option<f64>,
    pub exit_price: Option<f64>,
    pub pnl_multiplier: Option<f64>,
    pub max_price_reached: Option<f64>,
    pub hold_duration_minutes: Option<f64>,
}

impl RunRecord {
    pub fn to_result_record(&self) -> ResultRecord {
        let result = self.outcome.result();
        ResultRecord {
            instrument_id: self.signal.instrument_id.clone(),
            chain: self.signal.chain.clone(),
            caller_label: self.signal.caller_label.clone(),
            signal_timestamp: self.signal.timestamp,
            config_id: self.config_id.0.clone(),
            status: match &self.outcome {
                SimulationOutcome::Completed(_) => "completed".to_string(),
                SimulationOutcome::Skipped(reason) => reason.code().to_string(),
            },
            entry_price: result.map(|r| r.entry_price),
            exit_price: result.map(|r| r.final_exit_price),
            pnl_multiplier: result.map(|r| r.final_pnl_multiplier),
            max_price_reached: result.map(|r| r.max_price_reached),
            hold_duration_minutes: result.map(|r| r.hold_duration_seconds as f64 / 60.0),
        }
    }
}

/// A signal with its candles already fetched and canonicalized.
#[derive(Debug, Clone)]
pub struct PreparedSignal {
    pub signal: Signal,
    pub candles: Vec<Candle>,
}

/// Outcome of a sequential run over many signals.
#[derive(Debug, Default)]
pub struct RunReport {
    pub summary: PlanSummary,
    /// Signals whose candles could not be fetched or simulated, with the reason.
    pub failures: Vec<(Signal, String)>,
}

pub struct Driver {
    source: Arc<dyn CandleSource>,
    options: DriverOptions,
}

impl Driver {
    pub fn new(source: Arc<dyn CandleSource>, options: DriverOptions) -> Self {
        Self { source, options }
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// Candles of history the strategy's entry rule needs before the signal.
    fn warmup_for(&self, strategy: &CompiledStrategy) -> usize {
        let required = match strategy.entry() {
            EntryRule::AtSignal => 0,
            EntryRule::CloudBreakout { periods } => Cloud::new(periods).lookback(),
        };
        self.options.warmup_candles.max(required)
    }

    pub fn request_for(&self, signal: &Signal, strategy: &CompiledStrategy) -> CandleRequest {
        let step = self.options.interval.seconds();
        let warmup = self.warmup_for(strategy) as i64;
        CandleRequest::new(
            signal.instrument_id.clone(),
            signal.chain.clone(),
            self.options.interval,
            signal.timestamp - warmup * step,
            signal.timestamp + self.options.horizon_secs,
        )
    }

    /// Fetch the candles for one signal.
    pub fn prepare(
        &self,
        signal: &Signal,
        strategy: &CompiledStrategy,
    ) -> Result<PreparedSignal, DriverError> {
        let request = self.request_for(signal, strategy);
        let candles = self
            .source
            .fetch(&request)
            .map_err(|source| DriverError::Data {
                label: request.label(),
                source,
            })?;
        debug!(
            instrument = %signal.instrument_id,
            chain = %signal.chain,
            count = candles.len(),
            "candles ready"
        );
        Ok(PreparedSignal {
            signal: signal.clone(),
            candles,
        })
    }

    /// Fetch candles for every signal, collecting per-signal failures.
    pub fn prepare_all(
        &self,
        signals: &[Signal],
        strategy: &CompiledStrategy,
    ) -> (Vec<PreparedSignal>, Vec<(Signal, String)>) {
        let mut prepared = Vec::with_capacity(signals.len());
        let mut failures = Vec::new();
        for signal in signals {
            match self.prepare(signal, strategy) {
                Ok(p) => prepared.push(p),
                Err(e) => {
                    warn!(instrument = %signal.instrument_id, reason = %e, "skipping signal");
                    failures.push((signal.clone(), e.to_string()));
                }
            }
        }
        (prepared, failures)
    }

    /// Fetch and simulate a single signal.
    pub fn run_signal(
        &self,
        signal: &Signal,
        strategy: &CompiledStrategy,
    ) -> Result<RunRecord, DriverError> {
        let prepared = self.prepare(signal, strategy)?;
        simulate_prepared(&prepared, strategy, &strategy.config_id())
    }

    /// Simulate every signal sequentially, writing a row per run to `sink`.
    pub fn run_all(
        &self,
        signals: &[Signal],
        strategy: &CompiledStrategy,
        sink: &mut dyn ResultSink,
    ) -> Result<RunReport, DriverError> {
        if signals.is_empty() {
            return Err(DriverError::NoMatchingSignals);
        }
        let config_id = strategy.config_id();
        info!(
            config_id = config_id.short(),
            signals = signals.len(),
            plan = %strategy.plan().label(),
            "starting run"
        );

        let mut report = RunReport::default();
        for signal in signals {
            let record = self
                .prepare(signal, strategy)
                .and_then(|p| simulate_prepared(&p, strategy, &config_id));
            match record {
                Ok(record) => {
                    report.summary.record(&record.outcome);
                    sink.write(&record.to_result_record())?;
                    log_outcome(&record);
                }
                Err(e) => {
                    warn!(instrument = %signal.instrument_id, reason = %e, "run failed");
                    report.summary.record_failure();
                    report.failures.push((signal.clone(), e.to_string()));
                }
            }
        }
        sink.flush()?;

        info!(
            config_id = config_id.short(),
            completed = report.summary.completed,
            skipped = report.summary.skipped(),
            failed = report.summary.failed,
            mean_multiplier = report.summary.mean_multiplier,
            "run finished"
        );
        Ok(report)
    }
}

/// Run the engine on already-fetched candles. An empty candle set is a
/// `no_candles` skip, not an error.
pub fn simulate_prepared(
    prepared: &PreparedSignal,
    strategy: &CompiledStrategy,
    config_id: &ConfigId,
) -> Result<RunRecord, DriverError> {
    let outcome = if prepared.candles.is_empty() {
        SimulationOutcome::Skipped(SkipReason::NoCandles)
    } else {
        simulate_signal(&prepared.candles, strategy, &prepared.signal.anchor()).map_err(
            |source| DriverError::Simulation {
                instrument: prepared.signal.instrument_id.clone(),
                source,
            },
        )?
    };
    Ok(RunRecord {
        signal: prepared.signal.clone(),
        config_id: config_id.clone(),
        outcome,
    })
}

fn log_outcome(record: &RunRecord) {
    match &record.outcome {
        SimulationOutcome::Completed(result) => debug!(
            instrument = %record.signal.instrument_id,
            multiplier = result.final_pnl_multiplier,
            events = result.events.len(),
            "completed"
        ),
        SimulationOutcome::Skipped(reason) => debug!(
            instrument = %record.signal.instrument_id,
            reason = reason.code(),
            "skipped"
        ),
    }
}

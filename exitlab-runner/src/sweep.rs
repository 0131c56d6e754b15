//! Parameter sweeps over exit plans.
//!
//! An [`ExitPlanGrid`] expands a base strategy into a deterministic list of
//! variants. [`Sweep`] runs every (variant, signal) pair on a bounded rayon
//! pool, in batches, folding each finished run into a per-plan
//! [`PlanSummary`]. Cancellation is checked before each run starts; runs
//! already in flight finish.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use exitlab_core::config::{
    BreakEvenBlock, CompiledStrategy, ConfigError, ExitPlan, LadderLevel, StrategyConfig,
    TrailingStop,
};
use exitlab_core::domain::ConfigId;

use crate::driver::{simulate_prepared, PreparedSignal, RunRecord};
use crate::summary::PlanSummary;

/// Largest grid expanded in one sweep.
pub const MAX_GRID_SIZE: usize = 100_000;

#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("grid file: {0}")]
    Parse(String),

    #[error("grid expands to {size} plans (limit {max})")]
    GridTooLarge { size: usize, max: usize },

    #[error("failed to start worker pool: {0}")]
    ThreadPool(String),
}

// ─── Grid ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum Toggle<T> {
    Value(T),
    Keyword(String),
}

/// A list where `"none"` / `"off"` entries mean "block disabled".
fn toggles<'de, D, T>(deserializer: D) -> Result<Vec<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let raw: Vec<Toggle<T>> = Vec::deserialize(deserializer)?;
    raw.into_iter()
        .map(|t| match t {
            Toggle::Value(v) => Ok(Some(v)),
            Toggle::Keyword(w) if w.eq_ignore_ascii_case("none") || w.eq_ignore_ascii_case("off") => {
                Ok(None)
            }
            Toggle::Keyword(w) => Err(de::Error::custom(format!(
                "unrecognized grid entry '{w}' (expected a value or \"none\")"
            ))),
        })
        .collect()
}

/// Values to try for each exit setting. An empty list keeps the base
/// strategy's value.
///
/// ```toml
/// stop_pcts = [0.1, 0.2, 0.3]
/// trailing = ["none", { trail_pct = 0.25, activation_multiple = 1.5 }]
/// target_multiples = [2.0, 3.0]
/// break_even_pcts = ["none", 0.1]
/// max_hold_secs = [3600, "none"]
/// ladders = [[{ fraction = 0.5, target_multiple = 2.0 }], []]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExitPlanGrid {
    pub stop_pcts: Vec<f64>,
    #[serde(deserialize_with = "toggles")]
    pub trailing: Vec<Option<TrailingStop>>,
    pub ladders: Vec<Vec<LadderLevel>>,
    #[serde(deserialize_with = "toggles")]
    pub target_multiples: Vec<Option<f64>>,
    #[serde(deserialize_with = "toggles")]
    pub break_even_pcts: Vec<Option<f64>>,
    #[serde(deserialize_with = "toggles")]
    pub max_hold_secs: Vec<Option<i64>>,
}

/// The base value when a dimension is empty, else every listed value.
fn axis<T: Clone>(values: &[T], base: T) -> Vec<T> {
    if values.is_empty() {
        vec![base]
    } else {
        values.to_vec()
    }
}

impl ExitPlanGrid {
    pub fn from_toml(text: &str) -> Result<Self, SweepError> {
        toml::from_str(text).map_err(|e| SweepError::Parse(e.to_string()))
    }

    /// Number of combinations before de-duplication.
    pub fn size(&self) -> usize {
        [
            self.stop_pcts.len(),
            self.trailing.len(),
            self.ladders.len(),
            self.target_multiples.len(),
            self.break_even_pcts.len(),
            self.max_hold_secs.len(),
        ]
        .iter()
        .map(|&n| n.max(1))
        .product()
    }

    /// Every combination applied to `base`, in a fixed nesting order (stop,
    /// trailing, ladder, target, break-even, max hold). Combinations that
    /// compile to an already-seen config ID are dropped.
    pub fn variants(&self, base: &StrategyConfig) -> Result<Vec<CompiledStrategy>, SweepError> {
        let size = self.size();
        if size > MAX_GRID_SIZE {
            return Err(SweepError::GridTooLarge {
                size,
                max: MAX_GRID_SIZE,
            });
        }

        let stops = axis(&self.stop_pcts, base.stop_loss.initial_pct);
        let trails = axis(&self.trailing, base.stop_loss.trailing);
        let ladders = axis(&self.ladders, base.ladder.clone());
        let targets = axis(&self.target_multiples, base.target_multiple);
        let break_evens = axis(
            &self.break_even_pcts,
            base.break_even.map(|b| b.armed_drawdown_pct),
        );
        let holds = axis(&self.max_hold_secs, base.max_hold_secs);

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for &stop in &stops {
            for &trailing in &trails {
                for ladder in &ladders {
                    for &target in &targets {
                        for &break_even in &break_evens {
                            for &hold in &holds {
                                let mut config = base.clone();
                                config.stop_loss.initial_pct = stop;
                                config.stop_loss.trailing = trailing;
                                config.ladder = ladder.clone();
                                config.target_multiple = target;
                                config.break_even = break_even
                                    .map(|armed_drawdown_pct| BreakEvenBlock { armed_drawdown_pct });
                                config.max_hold_secs = hold;
                                let compiled = config.compile()?;
                                if seen.insert(compiled.config_id()) {
                                    out.push(compiled);
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(out)
    }
}

// ─── Runner ─────────────────────────────────────────────────────────

/// Cooperative cancellation flag shared between a sweep and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepOptions {
    /// Worker threads.
    pub concurrency: usize,
    /// Runs dispatched per batch; cancellation and progress are checked
    /// between batches.
    pub batch_size: usize,
    /// Keep every `RunRecord` in the output, not just the summaries.
    pub retain_records: bool,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            batch_size: 256,
            retain_records: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SweepStatus {
    Done(PlanSummary),
    /// The sweep was cancelled before every run of this plan finished.
    Pending { completed: usize, total: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepRecord {
    pub config_id: ConfigId,
    pub exit_plan: ExitPlan,
    pub label: String,
    #[serde(flatten)]
    pub status: SweepStatus,
}

impl SweepRecord {
    pub fn summary(&self) -> Option<&PlanSummary> {
        match &self.status {
            SweepStatus::Done(summary) => Some(summary),
            SweepStatus::Pending { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepOutput {
    pub records: Vec<SweepRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub runs: Vec<RunRecord>,
    pub cancelled: bool,
}

impl SweepOutput {
    /// Finished plans by mean multiplier (best first), then pending plans.
    pub fn ranked(&self) -> Vec<&SweepRecord> {
        let mut ranked: Vec<&SweepRecord> = self.records.iter().collect();
        ranked.sort_by(|a, b| {
            let key = |r: &SweepRecord| r.summary().map(|s| s.mean_multiplier);
            match (key(a), key(b)) {
                (Some(x), Some(y)) => y.total_cmp(&x),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
        });
        ranked
    }
}

pub struct Sweep {
    options: SweepOptions,
    token: CancellationToken,
}

impl Sweep {
    pub fn new(options: SweepOptions) -> Self {
        Self {
            options,
            token: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn run(
        &self,
        strategies: &[CompiledStrategy],
        signals: &[PreparedSignal],
    ) -> Result<SweepOutput, SweepError> {
        self.run_with_progress(strategies, signals, |_, _| {})
    }

    /// Like [`run`](Self::run), calling `progress(done, total)` after each batch.
    pub fn run_with_progress<F>(
        &self,
        strategies: &[CompiledStrategy],
        signals: &[PreparedSignal],
        mut progress: F,
    ) -> Result<SweepOutput, SweepError>
    where
        F: FnMut(usize, usize),
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.concurrency.max(1))
            .build()
            .map_err(|e| SweepError::ThreadPool(e.to_string()))?;

        let ids: Vec<ConfigId> = strategies.iter().map(|s| s.config_id()).collect();
        let jobs: Vec<(usize, usize)> = (0..strategies.len())
            .flat_map(|p| (0..signals.len()).map(move |s| (p, s)))
            .collect();
        let total = jobs.len();
        info!(
            plans = strategies.len(),
            signals = signals.len(),
            runs = total,
            concurrency = self.options.concurrency.max(1),
            "starting sweep"
        );

        let mut summaries = vec![PlanSummary::new(); strategies.len()];
        let mut finished = vec![0usize; strategies.len()];
        let mut runs = Vec::new();
        let mut done = 0usize;

        for batch in jobs.chunks(self.options.batch_size.max(1)) {
            if self.token.is_cancelled() {
                break;
            }
            let results: Vec<_> = pool.install(|| {
                batch
                    .par_iter()
                    .map(|&(p, s)| {
                        if self.token.is_cancelled() {
                            return None;
                        }
                        Some((p, simulate_prepared(&signals[s], &strategies[p], &ids[p])))
                    })
                    .collect()
            });

            // Fold in job order so summaries do not depend on scheduling.
            for (p, result) in results.into_iter().flatten() {
                finished[p] += 1;
                done += 1;
                match result {
                    Ok(record) => {
                        summaries[p].record(&record.outcome);
                        if self.options.retain_records {
                            runs.push(record);
                        }
                    }
                    Err(e) => {
                        warn!(config_id = ids[p].short(), reason = %e, "run failed");
                        summaries[p].record_failure();
                    }
                }
            }
            progress(done, total);
        }

        let cancelled = self.token.is_cancelled();
        let records = strategies
            .iter()
            .zip(ids)
            .zip(summaries)
            .zip(finished)
            .map(|(((strategy, config_id), summary), completed)| SweepRecord {
                config_id,
                exit_plan: strategy.plan().clone(),
                label: strategy.plan().label(),
                status: if completed == signals.len() {
                    SweepStatus::Done(summary)
                } else {
                    SweepStatus::Pending {
                        completed,
                        total: signals.len(),
                    }
                },
            })
            .collect();

        info!(runs = done, total, cancelled, "sweep finished");
        Ok(SweepOutput {
            records,
            runs,
            cancelled,
        })
    }
}

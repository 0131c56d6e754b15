//! Streaming per-plan statistics.
//!
//! Memory is bounded regardless of how many runs are folded in: mean and
//! standard deviation use Welford's online update, skips are tallied by
//! reason code.

use std::collections::BTreeMap;

use serde::Serialize;

use exitlab_core::engine::SimulationOutcome;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanSummary {
    /// Every outcome folded in, plus failures.
    pub runs: usize,
    pub completed: usize,
    pub wins: usize,
    /// Runs that errored instead of producing an outcome.
    pub failed: usize,
    pub mean_multiplier: f64,
    pub stddev_multiplier: f64,
    pub best_multiplier: Option<f64>,
    pub worst_multiplier: Option<f64>,
    pub mean_hold_seconds: f64,
    pub skips: BTreeMap<String, usize>,
    #[serde(skip)]
    m2: f64,
}

impl PlanSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: &SimulationOutcome) {
        self.runs += 1;
        match outcome {
            SimulationOutcome::Skipped(reason) => {
                *self.skips.entry(reason.code().to_string()).or_insert(0) += 1;
            }
            SimulationOutcome::Completed(result) => {
                let x = result.final_pnl_multiplier;
                self.completed += 1;
                if result.is_win() {
                    self.wins += 1;
                }
                let n = self.completed as f64;
                let delta = x - self.mean_multiplier;
                self.mean_multiplier += delta / n;
                self.m2 += delta * (x - self.mean_multiplier);
                self.stddev_multiplier = if self.completed > 1 {
                    (self.m2 / (n - 1.0)).sqrt()
                } else {
                    0.0
                };
                self.mean_hold_seconds +=
                    (result.hold_duration_seconds as f64 - self.mean_hold_seconds) / n;
                self.best_multiplier = Some(self.best_multiplier.map_or(x, |b| b.max(x)));
                self.worst_multiplier = Some(self.worst_multiplier.map_or(x, |w| w.min(x)));
            }
        }
    }

    pub fn record_failure(&mut self) {
        self.runs += 1;
        self.failed += 1;
    }

    pub fn skipped(&self) -> usize {
        self.skips.values().sum()
    }

    /// Share of completed runs that ended above 1.0.
    pub fn win_rate(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.wins as f64 / self.completed as f64
        }
    }
}

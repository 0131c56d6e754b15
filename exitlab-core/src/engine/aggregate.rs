//! Result aggregation: folds an event log into a run summary.

use serde::{Deserialize, Serialize};

use crate::domain::{EventKind, SimulationEvent};

/// Running PnL in units of original capital.
///
/// Each closing fill realizes `fraction × (exit / leg_entry − 1)`; fees are
/// subtracted as they are charged. The multiplier is `1 + net`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PnlLedger {
    realized: f64,
    fees: f64,
}

impl PnlLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_fill(&mut self, fraction: f64, exit_price: f64, entry_price: f64) {
        self.realized += fraction * (exit_price / entry_price - 1.0);
    }

    pub fn charge(&mut self, fee: f64) {
        self.fees += fee;
    }

    pub fn net(&self) -> f64 {
        self.realized - self.fees
    }

    pub fn fees(&self) -> f64 {
        self.fees
    }

    pub fn multiplier(&self) -> f64 {
        1.0 + self.net()
    }
}

/// Why a run produced no trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// No candles at or after the signal.
    NoCandles,
    /// The entry rule never had enough indicator history.
    InsufficientHistory { required: usize, available: usize },
    /// Enough data, but the entry condition never held.
    EntryNotTriggered,
}

impl SkipReason {
    /// Stable machine-readable code for tallies and persisted rows.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoCandles => "no_candles",
            Self::InsufficientHistory { .. } => "insufficient_history",
            Self::EntryNotTriggered => "entry_not_triggered",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub final_pnl_multiplier: f64,
    pub events: Vec<SimulationEvent>,
    /// Realized entry price of the first leg.
    pub entry_price: f64,
    /// Realized price of the last closing fill.
    pub final_exit_price: f64,
    pub max_price_reached: f64,
    pub hold_duration_seconds: i64,
    pub re_entries: u32,
    pub total_fees: f64,
}

impl SimulationResult {
    pub fn pnl_pct(&self) -> f64 {
        (self.final_pnl_multiplier - 1.0) * 100.0
    }

    pub fn is_win(&self) -> bool {
        self.final_pnl_multiplier > 1.0
    }
}

/// Outcome of one simulation: a completed trade or a typed skip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SimulationOutcome {
    Completed(SimulationResult),
    Skipped(SkipReason),
}

impl SimulationOutcome {
    pub fn result(&self) -> Option<&SimulationResult> {
        match self {
            Self::Completed(r) => Some(r),
            Self::Skipped(_) => None,
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Completed(_) => None,
            Self::Skipped(reason) => Some(*reason),
        }
    }
}

/// Fold an ordered event log into a summary.
///
/// An empty log (no entry ever happened) is reported as
/// `Skipped(EntryNotTriggered)`.
pub fn aggregate(events: Vec<SimulationEvent>, max_price_reached: f64) -> SimulationOutcome {
    let Some(first_entry) = events.iter().find(|e| e.kind == EventKind::Entry) else {
        return SimulationOutcome::Skipped(SkipReason::EntryNotTriggered);
    };
    let entry_price = first_entry.price;
    let entry_timestamp = first_entry.timestamp;

    let mut ledger = PnlLedger::new();
    let mut leg_entries: Vec<f64> = Vec::new();
    let mut final_exit_price = entry_price;
    let mut re_entries = 0;

    for event in &events {
        let leg = event.leg as usize;
        if event.kind.opens_leg() {
            if leg_entries.len() <= leg {
                leg_entries.resize(leg + 1, event.price);
            }
            leg_entries[leg] = event.price;
            if event.kind == EventKind::ReEntry {
                re_entries += 1;
            }
        } else if event.kind.is_closing() {
            let leg_entry = leg_entries.get(leg).copied().unwrap_or(entry_price);
            ledger.record_fill(event.fraction, event.price, leg_entry);
            final_exit_price = event.price;
        }
        ledger.charge(event.fee);
    }

    let last_timestamp = events.last().map_or(entry_timestamp, |e| e.timestamp);

    SimulationOutcome::Completed(SimulationResult {
        final_pnl_multiplier: ledger.multiplier(),
        entry_price,
        final_exit_price,
        max_price_reached,
        hold_duration_seconds: last_timestamp - entry_timestamp,
        re_entries,
        total_fees: ledger.fees(),
        events,
    })
}

//! Property tests for runner invariants.
//!
//! 1. Canonicalized candles are strictly time-ordered, consistent and stable
//!    under a second pass
//! 2. Streaming plan summaries agree with a two-pass computation
//! 3. Grid expansion never yields two variants with the same config ID

use proptest::prelude::*;
use std::collections::HashSet;

use exitlab_core::config::StrategyConfig;
use exitlab_core::domain::{validate_candles, Candle};
use exitlab_core::engine::{SimulationOutcome, SimulationResult};
use exitlab_runner::{canonicalize, ExitPlanGrid, PlanSummary};

// ── Strategies (proptest) ────────────────────────────────────────────

/// Candles with shuffled, duplicated timestamps and some broken rows.
fn arb_messy_candles() -> impl Strategy<Value = Vec<Candle>> {
    prop::collection::vec(
        (0..50_i64, 0.1..10.0_f64, 0.0..0.5_f64, 0.0..0.5_f64, any::<bool>()),
        0..80,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .map(|(slot, open, up, down, broken)| {
                let high = open * (1.0 + up);
                let low = open * (1.0 - down);
                if broken {
                    Candle::new(slot * 60, open, low, high, open, 1.0)
                } else {
                    Candle::new(slot * 60, open, high, low, open, 1.0)
                }
            })
            .collect()
    })
}

fn outcome(multiplier: f64) -> SimulationOutcome {
    SimulationOutcome::Completed(SimulationResult {
        final_pnl_multiplier: multiplier,
        events: Vec::new(),
        entry_price: 1.0,
        final_exit_price: multiplier,
        max_price_reached: multiplier.max(1.0),
        hold_duration_seconds: 60,
        re_entries: 0,
        total_fees: 0.0,
    })
}

// ── 1. Canonicalization ──────────────────────────────────────────────

proptest! {
    #[test]
    fn canonical_candles_are_ordered_and_valid(candles in arb_messy_candles()) {
        let total = candles.len();
        let (clean, dropped) = canonicalize(candles);
        prop_assert_eq!(clean.len() + dropped, total);
        for pair in clean.windows(2) {
            prop_assert!(pair[0].timestamp < pair[1].timestamp);
        }
        if !clean.is_empty() {
            prop_assert!(validate_candles(&clean).is_ok());
        }
        let (again, dropped_again) = canonicalize(clean.clone());
        prop_assert_eq!(again, clean);
        prop_assert_eq!(dropped_again, 0);
    }
}

// ── 2. Streaming summaries ───────────────────────────────────────────

proptest! {
    #[test]
    fn streaming_summary_matches_two_pass(values in prop::collection::vec(0.01..20.0_f64, 2..60)) {
        let mut summary = PlanSummary::new();
        for v in &values {
            summary.record(&outcome(*v));
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        prop_assert!((summary.mean_multiplier - mean).abs() < 1e-9 * mean.max(1.0));
        prop_assert!((summary.stddev_multiplier - var.sqrt()).abs() < 1e-6);
        prop_assert_eq!(summary.completed, values.len());
        let wins = values.iter().filter(|v| **v > 1.0).count();
        prop_assert_eq!(summary.wins, wins);
    }
}

// ── 3. Grid expansion ────────────────────────────────────────────────

proptest! {
    #[test]
    fn grid_variants_have_unique_ids(
        stops in prop::collection::vec(prop_oneof![Just(0.1), Just(0.2), Just(0.3)], 1..5),
        targets in prop::collection::vec(prop_oneof![Just(2.0), Just(3.0)], 1..4),
    ) {
        let grid = ExitPlanGrid {
            stop_pcts: stops,
            target_multiples: targets.into_iter().map(Some).collect(),
            ..ExitPlanGrid::default()
        };
        let variants = grid.variants(&StrategyConfig::new(0.2).with_target_multiple(2.0)).unwrap();
        prop_assert!(variants.len() <= grid.size());
        let ids: HashSet<_> = variants.iter().map(|s| s.config_id()).collect();
        prop_assert_eq!(ids.len(), variants.len());
    }
}

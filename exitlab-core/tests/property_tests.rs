//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. Fraction conservation: each leg closes exactly the fraction it opened
//! 2. Stop monotonicity: recorded stop moves never go down within a leg
//! 3. Determinism: identical inputs give identical outcomes
//! 4. Stop-first: a first post-entry candle through the stop yields one stop_loss and no targets
//! 5. Termination: nothing follows a stop_loss/time_stop/final_exit on the same leg
//! 6. Break-even: once armed, a trigger-priced stop-out never loses on the remainder

use proptest::prelude::*;
use std::collections::BTreeMap;

use exitlab_core::config::{GapPolicy, ReEntryConfig, StrategyConfig, TieBreakPolicy};
use exitlab_core::domain::{Candle, EventKind, SimulationEvent};
use exitlab_core::engine::{simulate, SimulationOutcome};

// ── Strategies (proptest) ────────────────────────────────────────────

/// Random-walk candles with consistent OHLC, starting at 1.0.
fn arb_candles(max_len: usize) -> impl Strategy<Value = Vec<Candle>> {
    prop::collection::vec((-0.3..0.3_f64, 0.0..0.25_f64, 0.0..0.2_f64), 2..max_len).prop_map(
        |steps| {
            let mut price = 1.0;
            steps
                .into_iter()
                .enumerate()
                .map(|(i, (ret, up, down))| {
                    let open = price;
                    let close = open * (1.0 + ret);
                    let high = open.max(close) * (1.0 + up);
                    let low = open.min(close) * (1.0 - down);
                    price = close;
                    Candle::new(i as i64 * 60, open, high, low, close, 1.0)
                })
                .collect()
        },
    )
}

/// 1–4 ladder levels with ascending targets and fractions summing to at most 1.
fn arb_ladder() -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((0.05..1.0_f64, 0.05..1.5_f64), 1..5).prop_map(|raw| {
        let total: f64 = raw.iter().map(|(w, _)| w).sum();
        let scale = if total > 1.0 { 1.0 / total } else { 1.0 };
        let mut target = 1.0;
        raw.into_iter()
            .map(|(w, step)| {
                target += step;
                ((w * scale).min(1.0), target)
            })
            .collect()
    })
}

fn arb_tie_break() -> impl Strategy<Value = TieBreakPolicy> {
    prop_oneof![
        Just(TieBreakPolicy::StopFirst),
        Just(TieBreakPolicy::TargetFirst),
        Just(TieBreakPolicy::OhlcPath),
    ]
}

fn arb_config() -> impl Strategy<Value = StrategyConfig> {
    (
        0.05..0.5_f64,
        arb_ladder(),
        prop::option::of((0.05..0.5_f64, 1.0..2.0_f64)),
        prop::option::of(0.05..0.5_f64),
        prop::option::of(60..3_000_i64),
        arb_tie_break(),
        any::<bool>(),
        prop::option::of((1..3_u32, 0.1..1.0_f64, 0.05..0.5_f64)),
    )
        .prop_map(
            |(stop, ladder, trailing, break_even, max_hold, tie_break, gap_at_open, re_entry)| {
                let mut config = StrategyConfig::new(stop)
                    .with_ladder(&ladder)
                    .with_tie_break(tie_break)
                    .with_gap_fill(if gap_at_open {
                        GapPolicy::FillAtOpen
                    } else {
                        GapPolicy::FillAtTrigger
                    });
                if let Some((trail_pct, activation)) = trailing {
                    config = config.with_trailing(trail_pct, activation);
                }
                if let Some(pct) = break_even {
                    config = config.with_break_even(pct);
                }
                if let Some(seconds) = max_hold {
                    config = config.with_max_hold(seconds);
                }
                if let Some((max_re_entries, size_fraction, threshold)) = re_entry {
                    config = config.with_re_entry(ReEntryConfig {
                        enabled: true,
                        max_re_entries,
                        size_fraction,
                        recovery_threshold_pct: threshold,
                        recovery_window_secs: None,
                    });
                }
                config
            },
        )
}

fn events_of(outcome: &SimulationOutcome) -> &[SimulationEvent] {
    outcome.result().map(|r| r.events.as_slice()).unwrap_or(&[])
}

fn by_leg(events: &[SimulationEvent]) -> BTreeMap<u32, Vec<&SimulationEvent>> {
    let mut legs: BTreeMap<u32, Vec<&SimulationEvent>> = BTreeMap::new();
    for e in events {
        legs.entry(e.leg).or_default().push(e);
    }
    legs
}

// ── 1. Fraction conservation ─────────────────────────────────────────

proptest! {
    #[test]
    fn closed_fractions_match_opened(candles in arb_candles(60), config in arb_config()) {
        let strategy = config.compile().unwrap();
        let outcome = simulate(&candles, &strategy).unwrap();
        for (leg, events) in by_leg(events_of(&outcome)) {
            let opened: f64 = events.iter().filter(|e| e.kind.opens_leg()).map(|e| e.fraction).sum();
            let closed: f64 = events.iter().filter(|e| e.kind.is_closing()).map(|e| e.fraction).sum();
            prop_assert!(
                (opened - closed).abs() < 1e-9,
                "leg {leg}: opened {opened}, closed {closed}"
            );
        }
    }

    #[test]
    fn ladder_fills_never_exceed_leg_size(candles in arb_candles(60), config in arb_config()) {
        let strategy = config.compile().unwrap();
        let outcome = simulate(&candles, &strategy).unwrap();
        for (_, events) in by_leg(events_of(&outcome)) {
            let size = events[0].fraction;
            let ladder: f64 = events
                .iter()
                .filter(|e| e.kind == EventKind::TargetHit)
                .map(|e| e.fraction)
                .sum();
            prop_assert!(ladder <= size + 1e-9);
        }
    }
}

// ── 2. Stop monotonicity ─────────────────────────────────────────────

proptest! {
    #[test]
    fn stop_moves_are_non_decreasing(candles in arb_candles(80), config in arb_config()) {
        let strategy = config.compile().unwrap();
        let outcome = simulate(&candles, &strategy).unwrap();
        for (_, events) in by_leg(events_of(&outcome)) {
            let moves: Vec<f64> = events
                .iter()
                .filter(|e| e.kind == EventKind::StopMoved)
                .map(|e| e.price)
                .collect();
            for pair in moves.windows(2) {
                prop_assert!(pair[1] >= pair[0], "stop lowered from {} to {}", pair[0], pair[1]);
            }
        }
    }
}

// ── 3. Determinism ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn identical_inputs_identical_outcomes(candles in arb_candles(60), config in arb_config()) {
        let strategy = config.compile().unwrap();
        let a = simulate(&candles, &strategy).unwrap();
        let b = simulate(&candles, &strategy).unwrap();
        prop_assert_eq!(a, b);
    }
}

// ── 4. Stop-first on the first candle ────────────────────────────────

proptest! {
    #[test]
    fn first_candle_through_stop_closes_once(
        stop in 0.05..0.5_f64,
        ladder in arb_ladder(),
        spike in 1.0..8.0_f64,
        extra in arb_candles(20),
    ) {
        let entry = Candle::new(0, 1.0, 1.0, 1.0, 1.0, 1.0);
        let crash_low = (1.0 - stop) * 0.9;
        let crash = Candle::new(60, 1.0, spike, crash_low, crash_low, 1.0);
        let mut candles = vec![entry, crash];
        candles.extend(extra.into_iter().map(|c| Candle { timestamp: c.timestamp + 120, ..c }));

        let strategy = StrategyConfig::new(stop).with_ladder(&ladder).compile().unwrap();
        let outcome = simulate(&candles, &strategy).unwrap();
        let kinds: Vec<EventKind> = events_of(&outcome).iter().map(|e| e.kind).collect();
        prop_assert_eq!(kinds, vec![EventKind::Entry, EventKind::StopLoss]);
    }
}

// ── 5. Termination ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn nothing_follows_a_terminal_event(candles in arb_candles(60), config in arb_config()) {
        let strategy = config.compile().unwrap();
        let outcome = simulate(&candles, &strategy).unwrap();
        let events = events_of(&outcome);
        for pair in events.windows(2) {
            prop_assert!(pair[0].timestamp <= pair[1].timestamp);
        }
        for (_, events) in by_leg(events) {
            if let Some(pos) = events.iter().position(|e| e.kind.terminates_leg()) {
                prop_assert_eq!(pos, events.len() - 1);
            }
        }
    }
}

// ── 6. Break-even ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn armed_break_even_never_stops_below_entry(
        candles in arb_candles(80),
        stop in 0.05..0.5_f64,
        pct in 0.05..0.3_f64,
    ) {
        let strategy = StrategyConfig::new(stop)
            .with_target_multiple(50.0)
            .with_break_even(pct)
            .compile()
            .unwrap();
        let outcome = simulate(&candles, &strategy).unwrap();
        let events = events_of(&outcome);
        let armed = events
            .iter()
            .any(|e| e.kind == EventKind::StopMoved && e.description.contains("break-even"));
        if armed {
            let entry = events[0].nominal_price;
            if let Some(exit) = events.iter().find(|e| e.kind == EventKind::StopLoss) {
                prop_assert!(exit.nominal_price >= entry - 1e-12);
            }
        }
    }
}

//! Take-profit ladder.

use super::ExitSignal;
use crate::config::LadderLevel;
use crate::domain::{Candle, Position, FRACTION_EPSILON};

/// Lowest unfilled level whose target the candle high reaches.
///
/// Levels are expected in ascending target order. The fill amount is the
/// level's share of the leg size, clamped to what is still open.
pub fn next_fill(candle: &Candle, position: &Position, levels: &[LadderLevel]) -> Option<ExitSignal> {
    if !position.is_open() {
        return None;
    }
    levels
        .iter()
        .enumerate()
        .filter(|(i, _)| {
            position
                .filled_ladder_amounts
                .get(*i)
                .is_some_and(|filled| *filled <= FRACTION_EPSILON)
        })
        .map(|(i, level)| (i, level, position.nominal_entry_price * level.target_multiple))
        .find(|(_, _, target)| candle.high >= *target)
        .map(|(level, rung, target)| ExitSignal::TargetHit {
            level,
            nominal_price: target,
            fraction: (rung.fraction * position.size).min(position.remaining_fraction),
        })
}

/// True when any unfilled level is within the candle's range.
pub fn any_reachable(candle: &Candle, position: &Position, levels: &[LadderLevel]) -> bool {
    next_fill(candle, position, levels).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels() -> Vec<LadderLevel> {
        [(0.5, 2.0), (0.3, 3.0), (0.2, 5.0)]
            .iter()
            .map(|&(fraction, target_multiple)| LadderLevel {
                fraction,
                target_multiple,
            })
            .collect()
    }

    #[test]
    fn lowest_reachable_first() {
        let pos = Position::open(0, 1.0, 1.0, 0, 1.0, 3);
        let candle = Candle::new(60, 1.0, 3.5, 1.0, 3.0, 0.0);
        assert_eq!(
            next_fill(&candle, &pos, &levels()),
            Some(ExitSignal::TargetHit {
                level: 0,
                nominal_price: 2.0,
                fraction: 0.5
            })
        );
    }

    #[test]
    fn filled_levels_are_skipped() {
        let mut pos = Position::open(0, 1.0, 1.0, 0, 1.0, 3);
        pos.filled_ladder_amounts[0] = 0.5;
        pos.reduce(0.5);
        let candle = Candle::new(60, 1.0, 3.5, 1.0, 3.0, 0.0);
        match next_fill(&candle, &pos, &levels()) {
            Some(ExitSignal::TargetHit { level, fraction, .. }) => {
                assert_eq!(level, 1);
                assert!((fraction - 0.3).abs() < 1e-12);
            }
            other => panic!("expected level 1, got {other:?}"),
        }
    }

    #[test]
    fn scaled_by_leg_size() {
        let pos = Position::open(1, 1.0, 1.0, 0, 0.5, 3);
        let candle = Candle::new(60, 1.0, 2.0, 1.0, 2.0, 0.0);
        match next_fill(&candle, &pos, &levels()) {
            Some(ExitSignal::TargetHit { fraction, .. }) => assert!((fraction - 0.25).abs() < 1e-12),
            other => panic!("expected a fill, got {other:?}"),
        }
    }

    #[test]
    fn clamped_to_remaining() {
        let mut pos = Position::open(0, 1.0, 1.0, 0, 1.0, 3);
        pos.reduce(0.9);
        let candle = Candle::new(60, 1.0, 2.0, 1.0, 2.0, 0.0);
        match next_fill(&candle, &pos, &levels()) {
            Some(ExitSignal::TargetHit { fraction, .. }) => assert!((fraction - 0.1).abs() < 1e-12),
            other => panic!("expected a fill, got {other:?}"),
        }
    }

    #[test]
    fn nothing_reachable() {
        let pos = Position::open(0, 1.0, 1.0, 0, 1.0, 3);
        let candle = Candle::new(60, 1.0, 1.9, 0.9, 1.5, 0.0);
        assert!(!any_reachable(&candle, &pos, &levels()));
    }
}

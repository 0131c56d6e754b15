//! Open position state for one leg of a run.

use serde::{Deserialize, Serialize};

use super::ratchet::RatchetState;

/// Fractions below this are treated as fully closed.
pub const FRACTION_EPSILON: f64 = 1e-12;

/// One leg's position, created at an entry and mutated as fills occur.
///
/// `size` is the leg's starting fraction of the original position (1.0 for the
/// first leg, the re-entry size fraction afterwards). `remaining_fraction` and
/// `filled_ladder_amounts` use the same units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub leg: u32,
    /// Realized entry price (after entry slippage).
    pub entry_price: f64,
    /// Entry price before costs; stops and ladder targets are measured from it.
    pub nominal_entry_price: f64,
    pub entry_timestamp: i64,
    pub size: f64,
    pub remaining_fraction: f64,
    /// Parallel to the ladder levels of the exit plan.
    pub filled_ladder_amounts: Vec<f64>,
    pub armed_break_even: bool,
    pub trailing_armed: bool,
    /// Highest high seen since entry (starts at the nominal entry price).
    pub peak_price: f64,
    stop: RatchetState,
}

impl Position {
    pub fn open(
        leg: u32,
        entry_price: f64,
        nominal_entry_price: f64,
        entry_timestamp: i64,
        size: f64,
        ladder_levels: usize,
    ) -> Self {
        Self {
            leg,
            entry_price,
            nominal_entry_price,
            entry_timestamp,
            size,
            remaining_fraction: size,
            filled_ladder_amounts: vec![0.0; ladder_levels],
            armed_break_even: false,
            trailing_armed: false,
            peak_price: nominal_entry_price,
            stop: RatchetState::new(),
        }
    }

    pub fn current_stop_price(&self) -> Option<f64> {
        self.stop.current_level()
    }

    /// Propose a new stop. Returns the new level if the stop moved up.
    pub fn raise_stop(&mut self, proposed: f64) -> Option<f64> {
        self.stop.propose(proposed)
    }

    pub fn is_open(&self) -> bool {
        self.remaining_fraction > FRACTION_EPSILON
    }

    /// Reduce the remaining fraction, clamped to what is actually open.
    /// Returns the fraction closed.
    pub fn reduce(&mut self, fraction: f64) -> f64 {
        let closed = fraction.clamp(0.0, self.remaining_fraction);
        self.remaining_fraction -= closed;
        if self.remaining_fraction <= FRACTION_EPSILON {
            self.remaining_fraction = 0.0;
        }
        closed
    }

    /// Close whatever remains. Returns the fraction closed.
    pub fn close_all(&mut self) -> f64 {
        let closed = self.remaining_fraction;
        self.remaining_fraction = 0.0;
        closed
    }

    pub fn update_peak(&mut self, high: f64) {
        if high > self.peak_price {
            self.peak_price = high;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_position_starts_full() {
        let pos = Position::open(0, 1.01, 1.0, 100, 1.0, 3);
        assert_eq!(pos.remaining_fraction, 1.0);
        assert_eq!(pos.filled_ladder_amounts, vec![0.0; 3]);
        assert_eq!(pos.peak_price, 1.0);
        assert!(pos.current_stop_price().is_none());
        assert!(pos.is_open());
    }

    #[test]
    fn reduce_is_clamped() {
        let mut pos = Position::open(1, 1.0, 1.0, 0, 0.5, 0);
        assert_eq!(pos.reduce(0.3), 0.3);
        let closed = pos.reduce(0.5);
        assert!((closed - 0.2).abs() < 1e-12);
        assert!(!pos.is_open());
    }

    #[test]
    fn reduce_snaps_dust_to_zero() {
        let mut pos = Position::open(0, 1.0, 1.0, 0, 1.0, 0);
        pos.reduce(0.1 + 0.2);
        pos.reduce(0.7 - 1e-15);
        assert_eq!(pos.remaining_fraction, 0.0);
    }

    #[test]
    fn stop_only_rises() {
        let mut pos = Position::open(0, 1.0, 1.0, 0, 1.0, 0);
        assert_eq!(pos.raise_stop(0.8), Some(0.8));
        assert_eq!(pos.raise_stop(0.7), None);
        assert_eq!(pos.raise_stop(1.0), Some(1.0));
        assert_eq!(pos.current_stop_price(), Some(1.0));
    }

    #[test]
    fn peak_tracks_highs() {
        let mut pos = Position::open(0, 1.0, 1.0, 0, 1.0, 0);
        pos.update_peak(1.5);
        pos.update_peak(1.2);
        assert_eq!(pos.peak_price, 1.5);
    }
}

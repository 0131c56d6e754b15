//! Re-entry coordinator.
//!
//! After a stop-out, watches for price to recover by `recovery_threshold_pct`
//! off the lowest low seen since the stop. A recovery opens a new leg sized at
//! `size_fraction` of the original position. The number of re-entries per run
//! is capped by `max_re_entries`.

use crate::config::ReEntryConfig;
use crate::domain::Candle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReEntryTrigger {
    /// 1-based index of this re-entry (also its leg number).
    pub leg: u32,
    pub nominal_price: f64,
    pub size: f64,
    /// Post-stop low the recovery was measured from.
    pub from_low: f64,
}

#[derive(Debug, Clone, Copy)]
struct Watch {
    low: f64,
    stopped_at: i64,
}

#[derive(Debug, Clone)]
pub struct ReEntryCoordinator {
    config: ReEntryConfig,
    taken: u32,
    watch: Option<Watch>,
}

impl ReEntryCoordinator {
    pub fn new(config: ReEntryConfig) -> Self {
        Self {
            config,
            taken: 0,
            watch: None,
        }
    }

    /// Number of re-entries opened so far.
    pub fn taken(&self) -> u32 {
        self.taken
    }

    pub fn is_watching(&self) -> bool {
        self.watch.is_some()
    }

    /// Called with the candle on which a stop-loss closed a leg.
    pub fn on_stop_out(&mut self, candle: &Candle) {
        if !self.config.enabled || self.taken >= self.config.max_re_entries {
            self.watch = None;
            return;
        }
        self.watch = Some(Watch {
            low: candle.low,
            stopped_at: candle.timestamp,
        });
    }

    /// Called for each candle while flat. Returns a trigger when the candle
    /// reaches the recovery price; the fill is at that price, or at the open
    /// if the candle opened above it.
    pub fn on_candle(&mut self, candle: &Candle) -> Option<ReEntryTrigger> {
        let watch = self.watch.as_mut()?;
        if let Some(window) = self.config.recovery_window_secs {
            if candle.timestamp - watch.stopped_at > window {
                self.watch = None;
                return None;
            }
        }
        let trigger = watch.low * (1.0 + self.config.recovery_threshold_pct);
        if candle.high >= trigger {
            let from_low = watch.low;
            self.watch = None;
            self.taken += 1;
            return Some(ReEntryTrigger {
                leg: self.taken,
                nominal_price: candle.open.max(trigger),
                size: self.config.size_fraction,
                from_low,
            });
        }
        watch.low = watch.low.min(candle.low);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max: u32, window: Option<i64>) -> ReEntryConfig {
        ReEntryConfig {
            enabled: true,
            max_re_entries: max,
            size_fraction: 0.5,
            recovery_threshold_pct: 0.2,
            recovery_window_secs: window,
        }
    }

    fn candle(ts: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new(ts, open, high, low, close, 0.0)
    }

    #[test]
    fn triggers_on_recovery_from_post_stop_low() {
        let mut coord = ReEntryCoordinator::new(config(1, None));
        coord.on_stop_out(&candle(0, 1.0, 1.0, 0.8, 0.85));
        assert!(coord.on_candle(&candle(60, 0.85, 0.9, 0.5, 0.55)).is_none());
        // low is now 0.5 → trigger at 0.6
        let trig = coord.on_candle(&candle(120, 0.55, 0.65, 0.55, 0.62)).unwrap();
        assert_eq!(trig.leg, 1);
        assert!((trig.nominal_price - 0.6).abs() < 1e-12);
        assert_eq!(trig.size, 0.5);
        assert_eq!(trig.from_low, 0.5);
        assert!(!coord.is_watching());
    }

    #[test]
    fn gap_above_trigger_fills_at_open() {
        let mut coord = ReEntryCoordinator::new(config(1, None));
        coord.on_stop_out(&candle(0, 1.0, 1.0, 0.5, 0.5));
        let trig = coord.on_candle(&candle(60, 0.7, 0.75, 0.68, 0.7)).unwrap();
        assert_eq!(trig.nominal_price, 0.7);
    }

    #[test]
    fn cap_prevents_further_watching() {
        let mut coord = ReEntryCoordinator::new(config(1, None));
        coord.on_stop_out(&candle(0, 1.0, 1.0, 0.5, 0.5));
        assert!(coord.on_candle(&candle(60, 0.6, 0.7, 0.6, 0.7)).is_some());
        coord.on_stop_out(&candle(120, 0.6, 0.6, 0.4, 0.4));
        assert!(!coord.is_watching());
        assert!(coord.on_candle(&candle(180, 0.9, 2.0, 0.9, 2.0)).is_none());
        assert_eq!(coord.taken(), 1);
    }

    #[test]
    fn window_expiry_ends_watch() {
        let mut coord = ReEntryCoordinator::new(config(3, Some(100)));
        coord.on_stop_out(&candle(0, 1.0, 1.0, 0.5, 0.5));
        assert!(coord.on_candle(&candle(60, 0.5, 0.55, 0.5, 0.5)).is_none());
        assert!(coord.on_candle(&candle(180, 0.5, 0.9, 0.5, 0.9)).is_none());
        assert!(!coord.is_watching());
    }

    #[test]
    fn disabled_never_watches() {
        let mut coord = ReEntryCoordinator::new(ReEntryConfig::default());
        coord.on_stop_out(&candle(0, 1.0, 1.0, 0.5, 0.5));
        assert!(!coord.is_watching());
    }
}

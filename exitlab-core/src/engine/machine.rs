//! Position state machine: replays candles against one strategy.
//!
//! States: awaiting entry → open (partial fills repeat) → closed, with an
//! optional flat-and-watching phase between a stop-out and a re-entry.
//!
//! Per candle while a leg is open, in this order:
//! 1. stop check against the low (with the intrabar tie-break when a ladder
//!    target is also inside the candle's range)
//! 2. stop movement: trailing, then break-even arming
//! 3. ladder fills against the high, ascending
//! 4. time stop
//!
//! Exit rules start on the candle after the entry candle. A stop-loss or time
//! stop closes the whole leg. Whatever is open when the candles run out closes
//! at the last close.

use serde::{Deserialize, Serialize};

use super::aggregate::{aggregate, PnlLedger, SimulationOutcome, SkipReason};
use super::cost_model::{CostModel, Side};
use super::exits::{break_even, ladder, stop, time_stop, ExitSignal, StopSource};
use super::reentry::ReEntryCoordinator;
use super::tie_break::{self, IntrabarOrder};
use crate::config::{CompiledStrategy, EntryRule};
use crate::domain::{validate_candles, Candle, EventKind, Position, SimulationEvent};
use crate::error::SimError;
use crate::indicators::{Cloud, Indicator, Reading};

/// Where a simulation starts: the signal time and, optionally, the price
/// quoted with the signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalAnchor {
    pub timestamp: i64,
    #[serde(default)]
    pub price: Option<f64>,
}

impl SignalAnchor {
    pub fn at(timestamp: i64) -> Self {
        Self {
            timestamp,
            price: None,
        }
    }

    pub fn with_price(timestamp: i64, price: f64) -> Self {
        Self {
            timestamp,
            price: Some(price),
        }
    }
}

/// Simulate from the first candle.
pub fn simulate(
    candles: &[Candle],
    strategy: &CompiledStrategy,
) -> Result<SimulationOutcome, SimError> {
    validate_candles(candles)?;
    let anchor = SignalAnchor::at(candles[0].timestamp);
    simulate_signal(candles, strategy, &anchor)
}

/// Simulate a trade anchored at a signal.
///
/// Candles before the signal are only used as indicator history.
pub fn simulate_signal(
    candles: &[Candle],
    strategy: &CompiledStrategy,
    anchor: &SignalAnchor,
) -> Result<SimulationOutcome, SimError> {
    validate_candles(candles)?;
    if let Some(price) = anchor.price {
        if !(price.is_finite() && price > 0.0) {
            return Err(SimError::InvalidEntryPrice(price));
        }
    }

    let Some(start) = candles.iter().position(|c| c.timestamp >= anchor.timestamp) else {
        return Ok(SimulationOutcome::Skipped(SkipReason::NoCandles));
    };

    let (entry_index, nominal_entry) = match find_entry(candles, start, strategy.entry(), anchor) {
        Ok(found) => found,
        Err(reason) => return Ok(SimulationOutcome::Skipped(reason)),
    };

    let mut run = Run::new(strategy);
    run.open_leg(&candles[entry_index], nominal_entry, 1.0, 0, EventKind::Entry, None);

    for candle in &candles[entry_index + 1..] {
        if run.position.is_some() {
            run.max_price = run.max_price.max(candle.high);
            run.step(candle);
        } else if run.re_entry.is_watching() {
            if let Some(trigger) = run.re_entry.on_candle(candle) {
                let note = format!(
                    "re-entry {} after {:.1}% recovery from {:.6}",
                    trigger.leg,
                    strategy.re_entry().recovery_threshold_pct * 100.0,
                    trigger.from_low
                );
                run.open_leg(
                    candle,
                    trigger.nominal_price,
                    trigger.size,
                    trigger.leg,
                    EventKind::ReEntry,
                    Some(note),
                );
            }
        } else {
            break;
        }
    }

    if run.position.is_some() {
        if let Some(last) = candles.last() {
            run.close_remaining(last, EventKind::FinalExit, last.close, "end of data".to_string());
        }
    }

    Ok(aggregate(run.events, run.max_price))
}

/// Locate the entry candle and nominal entry price.
fn find_entry(
    candles: &[Candle],
    start: usize,
    rule: EntryRule,
    anchor: &SignalAnchor,
) -> Result<(usize, f64), SkipReason> {
    match rule {
        EntryRule::AtSignal => {
            let price = anchor.price.unwrap_or(candles[start].open);
            Ok((start, price))
        }
        EntryRule::CloudBreakout { periods } => {
            let cloud = Cloud::new(periods);
            let mut shortfall = None;
            for (i, candle) in candles.iter().enumerate().skip(start) {
                match cloud.at(candles, i) {
                    Reading::Ready(values) => {
                        if values.is_bullish_breakout(candle.close) {
                            return Ok((i, candle.close));
                        }
                        shortfall = Some(SkipReason::EntryNotTriggered);
                    }
                    Reading::Insufficient {
                        required,
                        available,
                    } => {
                        if shortfall.is_none() {
                            shortfall = Some(SkipReason::InsufficientHistory {
                                required,
                                available,
                            });
                        }
                    }
                }
            }
            Err(shortfall.unwrap_or(SkipReason::NoCandles))
        }
    }
}

/// Mutable state of one run.
struct Run<'a> {
    strategy: &'a CompiledStrategy,
    cost: CostModel,
    ledger: PnlLedger,
    events: Vec<SimulationEvent>,
    position: Option<Position>,
    stop_source: StopSource,
    re_entry: ReEntryCoordinator,
    max_price: f64,
}

impl<'a> Run<'a> {
    fn new(strategy: &'a CompiledStrategy) -> Self {
        Self {
            strategy,
            cost: CostModel::from_config(strategy.costs()),
            ledger: PnlLedger::new(),
            events: Vec::new(),
            position: None,
            stop_source: StopSource::Initial,
            re_entry: ReEntryCoordinator::new(*strategy.re_entry()),
            max_price: f64::NEG_INFINITY,
        }
    }

    fn open_leg(
        &mut self,
        candle: &Candle,
        nominal_price: f64,
        size: f64,
        leg: u32,
        kind: EventKind,
        note: Option<String>,
    ) {
        let strategy = self.strategy;
        let plan = strategy.plan();
        let price = self.cost.fill_price(nominal_price, Side::Buy);
        let fee = self.cost.fee(size);
        self.ledger.charge(fee);

        let mut position = Position::open(
            leg,
            price,
            nominal_price,
            candle.timestamp,
            size,
            plan.ladder_levels().len(),
        );
        let mut description = format!("entry at {nominal_price:.6}");
        if let Some(block) = plan.stop() {
            let level = stop::initial_level(block, nominal_price);
            position.raise_stop(level);
            description.push_str(&format!(", stop {level:.6}"));
        }
        if let Some(note) = note {
            description = format!("{note}; {description}");
        }
        self.stop_source = StopSource::Initial;
        self.max_price = self.max_price.max(candle.high);

        self.events.push(SimulationEvent {
            kind,
            timestamp: candle.timestamp,
            price,
            nominal_price,
            fraction: size,
            fee,
            leg,
            remaining_after: size,
            cumulative_pnl_after: self.ledger.net(),
            description,
        });
        self.position = Some(position);
    }

    fn step(&mut self, candle: &Candle) {
        let strategy = self.strategy;
        let levels = strategy.plan().ladder_levels();
        let Some(position) = self.position.as_ref() else {
            return;
        };

        if let Some(ExitSignal::StopLoss { nominal_price }) =
            stop::check(candle, position, strategy.gap_fill())
        {
            let order = if ladder::any_reachable(candle, position, levels) {
                tie_break::resolve(strategy.tie_break(), candle)
            } else {
                IntrabarOrder::StopFirst
            };
            if order == IntrabarOrder::TargetsFirst {
                self.fill_ladder(candle);
            }
            if self.position.is_some() {
                let description = format!("{} hit at {nominal_price:.6}", self.stop_source.as_str());
                self.close_remaining(candle, EventKind::StopLoss, nominal_price, description);
                self.re_entry.on_stop_out(candle);
            }
            return;
        }

        self.move_stop(candle);
        self.fill_ladder(candle);

        let Some(block) = strategy.plan().max_hold() else {
            return;
        };
        let Some(position) = self.position.as_ref() else {
            return;
        };
        if let Some(ExitSignal::TimeStop { nominal_price }) = time_stop::check(candle, position, block) {
            let description = format!(
                "held {}s, max {}s",
                candle.timestamp - position.entry_timestamp,
                block.seconds
            );
            self.close_remaining(candle, EventKind::TimeStop, nominal_price, description);
        }
    }

    fn move_stop(&mut self, candle: &Candle) {
        let strategy = self.strategy;
        let plan = strategy.plan();
        let Some(position) = self.position.as_mut() else {
            return;
        };

        let mut moves = Vec::with_capacity(2);
        let trailing = plan.stop().and_then(|block| block.trailing);
        if let Some(trailing) = trailing {
            moves.extend(stop::trail(candle, position, &trailing));
        }
        if let Some(block) = plan.break_even() {
            moves.extend(break_even::check(candle, position, block));
        }

        position.update_peak(candle.high);
        if let Some(trailing) = trailing {
            if position.peak_price >= position.nominal_entry_price * trailing.activation_multiple {
                position.trailing_armed = true;
            }
        }

        for signal in moves {
            let ExitSignal::MoveStop { to, source } = signal else {
                continue;
            };
            if source == StopSource::BreakEven {
                position.armed_break_even = true;
            }
            let Some(level) = position.raise_stop(to) else {
                continue;
            };
            self.stop_source = source;
            self.events.push(SimulationEvent {
                kind: EventKind::StopMoved,
                timestamp: candle.timestamp,
                price: level,
                nominal_price: level,
                fraction: 0.0,
                fee: 0.0,
                leg: position.leg,
                remaining_after: position.remaining_fraction,
                cumulative_pnl_after: self.ledger.net(),
                description: format!("{} moved to {level:.6}", source.as_str()),
            });
        }
    }

    fn fill_ladder(&mut self, candle: &Candle) {
        let strategy = self.strategy;
        let levels = strategy.plan().ladder_levels();
        loop {
            let Some(position) = self.position.as_mut() else {
                return;
            };
            let Some(ExitSignal::TargetHit {
                level,
                nominal_price,
                fraction,
            }) = ladder::next_fill(candle, position, levels)
            else {
                return;
            };
            position.filled_ladder_amounts[level] = fraction;
            let description = format!(
                "target {} ({}x) hit at {nominal_price:.6}",
                level + 1,
                levels[level].target_multiple
            );
            self.close(candle, EventKind::TargetHit, nominal_price, fraction, description);
        }
    }

    fn close_remaining(&mut self, candle: &Candle, kind: EventKind, nominal_price: f64, description: String) {
        let remaining = self.position.as_ref().map_or(0.0, |p| p.remaining_fraction);
        self.close(candle, kind, nominal_price, remaining, description);
    }

    /// Close `fraction` of the open leg. Borrow cost is charged when the leg
    /// goes flat.
    fn close(
        &mut self,
        candle: &Candle,
        kind: EventKind,
        nominal_price: f64,
        fraction: f64,
        description: String,
    ) {
        let Some(position) = self.position.as_mut() else {
            return;
        };
        let closed = if kind.terminates_leg() {
            position.close_all()
        } else {
            position.reduce(fraction)
        };
        let price = self.cost.fill_price(nominal_price, Side::Sell);
        let mut fee = self.cost.fee(closed * price / position.entry_price);
        let flat = !position.is_open();
        if flat {
            let held = candle.timestamp - position.entry_timestamp;
            fee += self.cost.borrow_cost(position.size, held);
        }

        self.ledger.record_fill(closed, price, position.entry_price);
        self.ledger.charge(fee);
        self.events.push(SimulationEvent {
            kind,
            timestamp: candle.timestamp,
            price,
            nominal_price,
            fraction: closed,
            fee,
            leg: position.leg,
            remaining_after: position.remaining_fraction,
            cumulative_pnl_after: self.ledger.net(),
            description,
        });
        if flat {
            self.position = None;
        }
    }
}

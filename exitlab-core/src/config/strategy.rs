//! Declarative strategy configuration.
//!
//! A `StrategyConfig` is what users write (JSON or TOML). `compile()` validates
//! it and lowers the exit settings into an [`ExitPlan`]; the engine only ever
//! sees the resulting [`CompiledStrategy`].

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use super::execution::{GapPolicy, TieBreakPolicy};
use super::exit_plan::{
    validate_levels, BreakEvenBlock, ExitBlock, ExitPlan, LadderBlock, LadderLevel, MaxHoldBlock,
    StopBlock, TrailingStop, LADDER_SUM_TOLERANCE,
};
use crate::domain::ConfigId;
use crate::indicators::CloudPeriods;

/// How a position is entered.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryRule {
    /// Enter on the first candle at or after the signal timestamp, at the
    /// signal price when one is supplied, otherwise at that candle's open.
    #[default]
    AtSignal,
    /// Enter at the close of the first candle that closes above the cloud
    /// while the short line is above the medium line.
    CloudBreakout {
        #[serde(default)]
        periods: CloudPeriods,
    },
}

/// Initial stop plus optional trailing behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopLossConfig {
    pub initial_pct: f64,
    /// `"none"`, a bare trail percentage, or `{ trail_pct, activation_multiple }`.
    #[serde(default, deserialize_with = "deserialize_trailing")]
    pub trailing: Option<TrailingStop>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TrailingRepr {
    Keyword(String),
    Pct(f64),
    Full(TrailingStop),
}

fn deserialize_trailing<'de, D>(deserializer: D) -> Result<Option<TrailingStop>, D::Error>
where
    D: Deserializer<'de>,
{
    let repr: Option<TrailingRepr> = Option::deserialize(deserializer)?;
    match repr {
        None => Ok(None),
        Some(TrailingRepr::Keyword(word)) if word.eq_ignore_ascii_case("none") => Ok(None),
        Some(TrailingRepr::Keyword(word)) => Err(de::Error::custom(format!(
            "unrecognized trailing setting '{word}' (expected \"none\", a number or a table)"
        ))),
        Some(TrailingRepr::Pct(trail_pct)) => Ok(Some(TrailingStop {
            trail_pct,
            activation_multiple: 1.0,
        })),
        Some(TrailingRepr::Full(t)) => Ok(Some(t)),
    }
}

/// Reduced-size re-entry after a stop-out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReEntryConfig {
    pub enabled: bool,
    pub max_re_entries: u32,
    /// Size of each re-entry leg, as a fraction of the original position.
    pub size_fraction: f64,
    /// Rise off the post-stop low that counts as a recovery (0.2 = +20%).
    pub recovery_threshold_pct: f64,
    /// Maximum time after the stop-out to wait for recovery; unbounded when absent.
    pub recovery_window_secs: Option<i64>,
}

impl Default for ReEntryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_re_entries: 1,
            size_fraction: 0.5,
            recovery_threshold_pct: 0.2,
            recovery_window_secs: None,
        }
    }
}

impl ReEntryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if !(self.size_fraction > 0.0 && self.size_fraction <= 1.0) {
            return Err(ConfigError::InvalidReEntry(format!(
                "size_fraction must be in (0, 1], got {}",
                self.size_fraction
            )));
        }
        if !(self.recovery_threshold_pct.is_finite() && self.recovery_threshold_pct > 0.0) {
            return Err(ConfigError::InvalidReEntry(format!(
                "recovery_threshold_pct must be positive, got {}",
                self.recovery_threshold_pct
            )));
        }
        if let Some(window) = self.recovery_window_secs {
            if window <= 0 {
                return Err(ConfigError::InvalidReEntry(format!(
                    "recovery_window_secs must be positive, got {window}"
                )));
            }
        }
        Ok(())
    }
}

/// Execution friction, all in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    pub entry_slippage_bps: f64,
    pub exit_slippage_bps: f64,
    pub taker_fee_bps: f64,
    pub borrow_apr_bps: f64,
}

impl CostConfig {
    pub fn frictionless() -> Self {
        Self::default()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("entry_slippage_bps", self.entry_slippage_bps, true),
            ("exit_slippage_bps", self.exit_slippage_bps, true),
            ("taker_fee_bps", self.taker_fee_bps, false),
            ("borrow_apr_bps", self.borrow_apr_bps, false),
        ];
        for (field, value, is_slippage) in fields {
            let out_of_range = !value.is_finite() || value < 0.0 || (is_slippage && value >= 10_000.0);
            if out_of_range {
                return Err(ConfigError::InvalidCost { field, value });
            }
        }
        Ok(())
    }
}

/// User-facing strategy document.
///
/// Unknown fields are ignored. `stop_loss` is required, and at least one
/// ladder level or a `target_multiple` must be present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default)]
    pub entry: EntryRule,
    pub stop_loss: StopLossConfig,
    #[serde(default, alias = "take_profit")]
    pub ladder: Vec<LadderLevel>,
    /// Full-exit target for whatever the ladder leaves open.
    #[serde(default)]
    pub target_multiple: Option<f64>,
    #[serde(default)]
    pub break_even: Option<BreakEvenBlock>,
    #[serde(default)]
    pub max_hold_secs: Option<i64>,
    #[serde(default)]
    pub re_entry: ReEntryConfig,
    #[serde(default)]
    pub costs: CostConfig,
    #[serde(default)]
    pub tie_break: TieBreakPolicy,
    #[serde(default)]
    pub gap_fill: GapPolicy,
}

impl StrategyConfig {
    /// Minimal config: a fixed stop and nothing else. Add a ladder or a
    /// target before compiling.
    pub fn new(stop_pct: f64) -> Self {
        Self {
            entry: EntryRule::AtSignal,
            stop_loss: StopLossConfig {
                initial_pct: stop_pct,
                trailing: None,
            },
            ladder: Vec::new(),
            target_multiple: None,
            break_even: None,
            max_hold_secs: None,
            re_entry: ReEntryConfig::default(),
            costs: CostConfig::default(),
            tie_break: TieBreakPolicy::default(),
            gap_fill: GapPolicy::default(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn with_entry(mut self, entry: EntryRule) -> Self {
        self.entry = entry;
        self
    }

    pub fn with_ladder(mut self, levels: &[(f64, f64)]) -> Self {
        self.ladder = levels
            .iter()
            .map(|&(fraction, target_multiple)| LadderLevel {
                fraction,
                target_multiple,
            })
            .collect();
        self
    }

    pub fn with_target_multiple(mut self, target_multiple: f64) -> Self {
        self.target_multiple = Some(target_multiple);
        self
    }

    pub fn with_trailing(mut self, trail_pct: f64, activation_multiple: f64) -> Self {
        self.stop_loss.trailing = Some(TrailingStop {
            trail_pct,
            activation_multiple,
        });
        self
    }

    pub fn with_break_even(mut self, armed_drawdown_pct: f64) -> Self {
        self.break_even = Some(BreakEvenBlock { armed_drawdown_pct });
        self
    }

    pub fn with_max_hold(mut self, seconds: i64) -> Self {
        self.max_hold_secs = Some(seconds);
        self
    }

    pub fn with_re_entry(mut self, re_entry: ReEntryConfig) -> Self {
        self.re_entry = re_entry;
        self
    }

    pub fn with_costs(mut self, costs: CostConfig) -> Self {
        self.costs = costs;
        self
    }

    pub fn with_tie_break(mut self, tie_break: TieBreakPolicy) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn with_gap_fill(mut self, gap_fill: GapPolicy) -> Self {
        self.gap_fill = gap_fill;
        self
    }

    /// Validate and lower into the form the engine consumes.
    pub fn compile(&self) -> Result<CompiledStrategy, ConfigError> {
        validate_levels(&self.ladder)?;
        if let Some(m) = self.target_multiple {
            if !(m.is_finite() && m > 1.0) {
                return Err(ConfigError::InvalidTargetMultiple(m));
            }
        }
        if self.ladder.is_empty() && self.target_multiple.is_none() {
            return Err(ConfigError::MissingExitTarget);
        }

        let mut blocks = vec![ExitBlock::Stop(StopBlock {
            initial_pct: self.stop_loss.initial_pct,
            trailing: self.stop_loss.trailing,
        })];
        if let Some(be) = self.break_even {
            blocks.push(ExitBlock::BreakEven(be));
        }

        let mut levels = self.ladder.clone();
        if let Some(target_multiple) = self.target_multiple {
            let allocated: f64 = levels.iter().map(|l| l.fraction).sum();
            let remainder = 1.0 - allocated;
            if remainder > LADDER_SUM_TOLERANCE {
                levels.push(LadderLevel {
                    fraction: remainder,
                    target_multiple,
                });
            }
        }
        if !levels.is_empty() {
            blocks.push(ExitBlock::Ladder(LadderBlock { levels }));
        }
        if let Some(seconds) = self.max_hold_secs {
            blocks.push(ExitBlock::MaxHold(MaxHoldBlock { seconds }));
        }

        CompiledStrategy::assemble(
            self.entry,
            ExitPlan::new(blocks),
            self.re_entry,
            self.costs,
            self.tie_break,
            self.gap_fill,
        )
    }
}

/// A validated strategy, ready for simulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledStrategy {
    entry: EntryRule,
    plan: ExitPlan,
    re_entry: ReEntryConfig,
    costs: CostConfig,
    tie_break: TieBreakPolicy,
    gap_fill: GapPolicy,
}

impl CompiledStrategy {
    fn assemble(
        entry: EntryRule,
        plan: ExitPlan,
        re_entry: ReEntryConfig,
        costs: CostConfig,
        tie_break: TieBreakPolicy,
        gap_fill: GapPolicy,
    ) -> Result<Self, ConfigError> {
        if let EntryRule::CloudBreakout { periods } = entry {
            periods.validate()?;
        }
        re_entry.validate()?;
        costs.validate()?;
        let plan = plan.validated()?;
        Ok(Self {
            entry,
            plan,
            re_entry,
            costs,
            tie_break,
            gap_fill,
        })
    }

    /// Same strategy with a different exit plan (used by sweeps).
    pub fn with_plan(&self, plan: ExitPlan) -> Result<Self, ConfigError> {
        Self::assemble(
            self.entry,
            plan,
            self.re_entry,
            self.costs,
            self.tie_break,
            self.gap_fill,
        )
    }

    pub fn entry(&self) -> EntryRule {
        self.entry
    }

    pub fn plan(&self) -> &ExitPlan {
        &self.plan
    }

    pub fn re_entry(&self) -> &ReEntryConfig {
        &self.re_entry
    }

    pub fn costs(&self) -> &CostConfig {
        &self.costs
    }

    pub fn tie_break(&self) -> TieBreakPolicy {
        self.tie_break
    }

    pub fn gap_fill(&self) -> GapPolicy {
        self.gap_fill
    }

    pub fn config_id(&self) -> ConfigId {
        ConfigId::of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balanced() -> StrategyConfig {
        StrategyConfig::new(0.2).with_ladder(&[(0.5, 2.0), (0.3, 3.0), (0.2, 5.0)])
    }

    #[test]
    fn compile_lowers_into_plan() {
        let compiled = balanced().with_break_even(0.1).with_max_hold(3600).compile().unwrap();
        let plan = compiled.plan();
        assert_eq!(plan.stop().unwrap().initial_pct, 0.2);
        assert_eq!(plan.ladder_levels().len(), 3);
        assert_eq!(plan.break_even().unwrap().armed_drawdown_pct, 0.1);
        assert_eq!(plan.max_hold().unwrap().seconds, 3600);
    }

    #[test]
    fn target_multiple_covers_remainder() {
        let compiled = StrategyConfig::new(0.2)
            .with_ladder(&[(0.5, 2.0)])
            .with_target_multiple(4.0)
            .compile()
            .unwrap();
        let levels = compiled.plan().ladder_levels();
        assert_eq!(levels.len(), 2);
        assert!((levels[1].fraction - 0.5).abs() < 1e-12);
        assert_eq!(levels[1].target_multiple, 4.0);
    }

    #[test]
    fn target_multiple_alone_is_enough() {
        let compiled = StrategyConfig::new(0.1).with_target_multiple(1.5).compile().unwrap();
        assert_eq!(compiled.plan().ladder_levels()[0].fraction, 1.0);
    }

    #[test]
    fn missing_exit_target_is_rejected() {
        assert_eq!(
            StrategyConfig::new(0.2).compile(),
            Err(ConfigError::MissingExitTarget)
        );
    }

    #[test]
    fn ladder_over_one_is_rejected() {
        let config = StrategyConfig::new(0.2).with_ladder(&[(0.7, 2.0), (0.7, 3.0)]);
        assert!(matches!(
            config.compile(),
            Err(ConfigError::LadderOverallocated { .. })
        ));
    }

    #[test]
    fn non_positive_stop_is_rejected() {
        let config = StrategyConfig::new(0.0).with_target_multiple(2.0);
        assert_eq!(config.compile(), Err(ConfigError::InvalidStopPct(0.0)));
    }

    #[test]
    fn bad_re_entry_is_rejected_only_when_enabled() {
        let re_entry = ReEntryConfig {
            enabled: false,
            size_fraction: 2.0,
            ..ReEntryConfig::default()
        };
        assert!(balanced().with_re_entry(re_entry).compile().is_ok());
        let re_entry = ReEntryConfig {
            enabled: true,
            ..re_entry
        };
        assert!(matches!(
            balanced().with_re_entry(re_entry).compile(),
            Err(ConfigError::InvalidReEntry(_))
        ));
    }

    #[test]
    fn negative_cost_is_rejected() {
        let costs = CostConfig {
            taker_fee_bps: -1.0,
            ..CostConfig::default()
        };
        assert_eq!(
            balanced().with_costs(costs).compile(),
            Err(ConfigError::InvalidCost {
                field: "taker_fee_bps",
                value: -1.0
            })
        );
    }

    #[test]
    fn json_document_with_unknown_fields() {
        let json = r#"{
            "stop_loss": {"initial_pct": 0.2, "trailing": "none"},
            "take_profit": [{"fraction": 0.5, "target_multiple": 2.0}],
            "target_multiple": 3.0,
            "tie_break": "target_first",
            "comment": "ignored",
            "costs": {"taker_fee_bps": 30}
        }"#;
        let config = StrategyConfig::from_json(json).unwrap();
        assert!(config.stop_loss.trailing.is_none());
        assert_eq!(config.ladder.len(), 1);
        assert_eq!(config.tie_break, TieBreakPolicy::TargetFirst);
        assert_eq!(config.costs.taker_fee_bps, 30.0);
        assert!(config.compile().is_ok());
    }

    #[test]
    fn trailing_accepts_number_and_table() {
        let json = r#"{"stop_loss": {"initial_pct": 0.2, "trailing": 0.25}, "target_multiple": 2.0}"#;
        let config = StrategyConfig::from_json(json).unwrap();
        assert_eq!(
            config.stop_loss.trailing,
            Some(TrailingStop {
                trail_pct: 0.25,
                activation_multiple: 1.0
            })
        );

        let toml_text = r#"
            target_multiple = 2.0
            [stop_loss]
            initial_pct = 0.15
            trailing = { trail_pct = 0.3, activation_multiple = 1.5 }
            [entry]
            type = "cloud_breakout"
        "#;
        let config = StrategyConfig::from_toml(toml_text).unwrap();
        assert_eq!(config.stop_loss.trailing.unwrap().activation_multiple, 1.5);
        assert_eq!(
            config.entry,
            EntryRule::CloudBreakout {
                periods: CloudPeriods::default()
            }
        );
    }

    #[test]
    fn trailing_rejects_unknown_keyword() {
        let json = r#"{"stop_loss": {"initial_pct": 0.2, "trailing": "sometimes"}, "target_multiple": 2.0}"#;
        assert!(matches!(
            StrategyConfig::from_json(json),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_stop_loss_is_parse_error() {
        let json = r#"{"target_multiple": 2.0}"#;
        assert!(matches!(
            StrategyConfig::from_json(json),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn config_id_tracks_content() {
        let a = balanced().compile().unwrap();
        let b = balanced().compile().unwrap();
        let c = balanced()
            .with_tie_break(TieBreakPolicy::OhlcPath)
            .compile()
            .unwrap();
        assert_eq!(a.config_id(), b.config_id());
        assert_ne!(a.config_id(), c.config_id());
    }

    #[test]
    fn with_plan_revalidates() {
        let compiled = balanced().compile().unwrap();
        let bad = ExitPlan::new(vec![]);
        assert_eq!(compiled.with_plan(bad), Err(ConfigError::EmptyExitPlan));
    }
}

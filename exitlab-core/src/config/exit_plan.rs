//! Exit plan: composable, independently toggleable exit blocks.
//!
//! Every block in a plan is evaluated on every candle. The block kinds form a
//! closed set so the evaluator matches on them exhaustively.

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

/// Tolerance used when checking that ladder fractions sum to at most 1.0.
pub const LADDER_SUM_TOLERANCE: f64 = 1e-9;

/// Trailing-stop parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingStop {
    /// Distance below the high-water mark, as a fraction (0.3 = 30%).
    pub trail_pct: f64,
    /// The trail arms once the high-water mark reaches entry × this multiple.
    #[serde(default = "default_activation_multiple")]
    pub activation_multiple: f64,
}

fn default_activation_multiple() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopBlock {
    /// Initial stop = entry × (1 − initial_pct).
    pub initial_pct: f64,
    #[serde(default)]
    pub trailing: Option<TrailingStop>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakEvenBlock {
    /// Drawdown from the peak (as a fraction of the peak) that arms the bailout.
    pub armed_drawdown_pct: f64,
}

/// One take-profit level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LadderLevel {
    /// Share of the leg's starting size sold at this level.
    pub fraction: f64,
    /// Target price = entry × target_multiple.
    pub target_multiple: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderBlock {
    pub levels: Vec<LadderLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaxHoldBlock {
    pub seconds: i64,
}

/// A single exit rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitBlock {
    Stop(StopBlock),
    BreakEven(BreakEvenBlock),
    Ladder(LadderBlock),
    MaxHold(MaxHoldBlock),
}

impl ExitBlock {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Stop(_) => "stop",
            Self::BreakEven(_) => "break_even",
            Self::Ladder(_) => "ladder",
            Self::MaxHold(_) => "max_hold",
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Stop(stop) => {
                if !(stop.initial_pct > 0.0 && stop.initial_pct < 1.0) {
                    return Err(ConfigError::InvalidStopPct(stop.initial_pct));
                }
                if let Some(t) = stop.trailing {
                    let pct_ok = t.trail_pct > 0.0 && t.trail_pct < 1.0;
                    let activation_ok =
                        t.activation_multiple.is_finite() && t.activation_multiple >= 1.0;
                    if !(pct_ok && activation_ok) {
                        return Err(ConfigError::InvalidTrailing {
                            trail_pct: t.trail_pct,
                            activation_multiple: t.activation_multiple,
                        });
                    }
                }
                Ok(())
            }
            Self::BreakEven(be) => {
                if be.armed_drawdown_pct > 0.0 && be.armed_drawdown_pct < 1.0 {
                    Ok(())
                } else {
                    Err(ConfigError::InvalidBreakEven(be.armed_drawdown_pct))
                }
            }
            Self::Ladder(ladder) => validate_levels(&ladder.levels),
            Self::MaxHold(hold) => {
                if hold.seconds > 0 {
                    Ok(())
                } else {
                    Err(ConfigError::InvalidMaxHold(hold.seconds))
                }
            }
        }
    }
}

/// Validate a list of ladder levels: positive fractions, targets above entry,
/// fractions summing to at most 1.0.
pub fn validate_levels(levels: &[LadderLevel]) -> Result<(), ConfigError> {
    let mut total = 0.0;
    for (index, level) in levels.iter().enumerate() {
        if !(level.fraction > 0.0 && level.fraction <= 1.0) {
            return Err(ConfigError::InvalidLadderFraction {
                index,
                fraction: level.fraction,
            });
        }
        if !(level.target_multiple.is_finite() && level.target_multiple > 1.0) {
            return Err(ConfigError::InvalidLadderTarget {
                index,
                target_multiple: level.target_multiple,
            });
        }
        total += level.fraction;
    }
    if total > 1.0 + LADDER_SUM_TOLERANCE {
        return Err(ConfigError::LadderOverallocated { total });
    }
    Ok(())
}

/// A set of exit blocks evaluated together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitPlan {
    pub blocks: Vec<ExitBlock>,
}

impl ExitPlan {
    pub fn new(blocks: Vec<ExitBlock>) -> Self {
        Self { blocks }
    }

    /// Validate every block and return a normalized copy (ladder levels sorted
    /// by ascending target).
    pub fn validated(&self) -> Result<Self, ConfigError> {
        if self.blocks.is_empty() {
            return Err(ConfigError::EmptyExitPlan);
        }
        let mut seen: Vec<&'static str> = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            let kind = block.kind_name();
            if seen.contains(&kind) {
                return Err(ConfigError::DuplicateBlock(kind));
            }
            seen.push(kind);
            block.validate()?;
        }

        let blocks = self
            .blocks
            .iter()
            .map(|block| match block {
                ExitBlock::Ladder(ladder) => {
                    let mut levels = ladder.levels.clone();
                    levels.sort_by(|a, b| a.target_multiple.total_cmp(&b.target_multiple));
                    ExitBlock::Ladder(LadderBlock { levels })
                }
                other => other.clone(),
            })
            .collect();
        Ok(Self { blocks })
    }

    pub fn stop(&self) -> Option<&StopBlock> {
        self.blocks.iter().find_map(|b| match b {
            ExitBlock::Stop(s) => Some(s),
            _ => None,
        })
    }

    pub fn break_even(&self) -> Option<&BreakEvenBlock> {
        self.blocks.iter().find_map(|b| match b {
            ExitBlock::BreakEven(be) => Some(be),
            _ => None,
        })
    }

    /// Ladder levels in evaluation order (empty when the plan has no ladder).
    pub fn ladder_levels(&self) -> &[LadderLevel] {
        self.blocks
            .iter()
            .find_map(|b| match b {
                ExitBlock::Ladder(l) => Some(l.levels.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    pub fn max_hold(&self) -> Option<&MaxHoldBlock> {
        self.blocks.iter().find_map(|b| match b {
            ExitBlock::MaxHold(h) => Some(h),
            _ => None,
        })
    }

    /// Compact human-readable label, e.g. `stop20+trail30@1.5+be10+ladder3+hold14400s`.
    pub fn label(&self) -> String {
        let parts: Vec<String> = self
            .blocks
            .iter()
            .map(|b| match b {
                ExitBlock::Stop(s) => {
                    let mut part = format!("stop{}", pct(s.initial_pct));
                    if let Some(t) = s.trailing {
                        part.push_str(&format!(
                            "+trail{}@{}",
                            pct(t.trail_pct),
                            t.activation_multiple
                        ));
                    }
                    part
                }
                ExitBlock::BreakEven(be) => format!("be{}", pct(be.armed_drawdown_pct)),
                ExitBlock::Ladder(l) => format!("ladder{}", l.levels.len()),
                ExitBlock::MaxHold(h) => format!("hold{}s", h.seconds),
            })
            .collect();
        parts.join("+")
    }
}

fn pct(fraction: f64) -> String {
    let v = fraction * 100.0;
    if (v - v.round()).abs() < 1e-9 {
        format!("{}", v.round() as i64)
    } else {
        format!("{v:.1}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ladder(levels: &[(f64, f64)]) -> ExitBlock {
        ExitBlock::Ladder(LadderBlock {
            levels: levels
                .iter()
                .map(|&(fraction, target_multiple)| LadderLevel {
                    fraction,
                    target_multiple,
                })
                .collect(),
        })
    }

    fn stop(pct: f64) -> ExitBlock {
        ExitBlock::Stop(StopBlock {
            initial_pct: pct,
            trailing: None,
        })
    }

    #[test]
    fn valid_plan_sorts_ladder() {
        let plan = ExitPlan::new(vec![stop(0.2), ladder(&[(0.2, 5.0), (0.5, 2.0), (0.3, 3.0)])]);
        let plan = plan.validated().unwrap();
        let targets: Vec<f64> = plan.ladder_levels().iter().map(|l| l.target_multiple).collect();
        assert_eq!(targets, vec![2.0, 3.0, 5.0]);
    }

    #[test]
    fn rejects_overallocated_ladder() {
        let plan = ExitPlan::new(vec![ladder(&[(0.6, 2.0), (0.5, 3.0)])]);
        assert!(matches!(
            plan.validated(),
            Err(ConfigError::LadderOverallocated { .. })
        ));
    }

    #[test]
    fn rejects_zero_fraction() {
        let plan = ExitPlan::new(vec![ladder(&[(0.0, 2.0)])]);
        assert!(matches!(
            plan.validated(),
            Err(ConfigError::InvalidLadderFraction { index: 0, .. })
        ));
    }

    #[test]
    fn rejects_non_positive_stop() {
        let plan = ExitPlan::new(vec![stop(0.0)]);
        assert_eq!(plan.validated(), Err(ConfigError::InvalidStopPct(0.0)));
        let plan = ExitPlan::new(vec![stop(-0.1)]);
        assert_eq!(plan.validated(), Err(ConfigError::InvalidStopPct(-0.1)));
    }

    #[test]
    fn rejects_duplicate_blocks() {
        let plan = ExitPlan::new(vec![stop(0.1), stop(0.2)]);
        assert_eq!(plan.validated(), Err(ConfigError::DuplicateBlock("stop")));
    }

    #[test]
    fn rejects_empty_plan() {
        assert_eq!(
            ExitPlan::new(vec![]).validated(),
            Err(ConfigError::EmptyExitPlan)
        );
    }

    #[test]
    fn tagged_json_form() {
        let json = r#"{"blocks":[
            {"kind":"stop","initial_pct":0.2,"trailing":{"trail_pct":0.3}},
            {"kind":"break_even","armed_drawdown_pct":0.1},
            {"kind":"max_hold","seconds":3600}
        ]}"#;
        let plan: ExitPlan = serde_json::from_str(json).unwrap();
        let plan = plan.validated().unwrap();
        let trailing = plan.stop().unwrap().trailing.unwrap();
        assert_eq!(trailing.activation_multiple, 1.0);
        assert_eq!(plan.break_even().unwrap().armed_drawdown_pct, 0.1);
        assert_eq!(plan.max_hold().unwrap().seconds, 3600);
        assert!(plan.ladder_levels().is_empty());
    }

    #[test]
    fn unknown_block_kind_is_rejected() {
        let json = r#"{"blocks":[{"kind":"martingale","step":2}]}"#;
        assert!(serde_json::from_str::<ExitPlan>(json).is_err());
    }

    #[test]
    fn label_is_compact() {
        let plan = ExitPlan::new(vec![
            ExitBlock::Stop(StopBlock {
                initial_pct: 0.2,
                trailing: Some(TrailingStop {
                    trail_pct: 0.3,
                    activation_multiple: 1.5,
                }),
            }),
            ladder(&[(0.5, 2.0)]),
            ExitBlock::MaxHold(MaxHoldBlock { seconds: 600 }),
        ]);
        assert_eq!(plan.label(), "stop20+trail30@1.5+ladder1+hold600s");
    }
}

//! Named strategy presets.
//!
//! A [`PresetRegistry`] is an ordinary value: build it with
//! [`PresetRegistry::builtin`], add or override entries, and pass it to
//! whatever needs to resolve a name.

use std::collections::BTreeMap;

use exitlab_core::config::{
    CompiledStrategy, ConfigError, EntryRule, ReEntryConfig, StrategyConfig, TieBreakPolicy,
};
use exitlab_core::indicators::CloudPeriods;

#[derive(Debug, Clone, Default)]
pub struct PresetRegistry {
    presets: BTreeMap<String, StrategyConfig>,
}

impl PresetRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in presets:
    ///
    /// | name | shape |
    /// |------|-------|
    /// | `balanced` | 20% stop, ladder 50%@2x, 30%@3x, 20%@5x |
    /// | `trailing_runner` | 25% stop, 30% trail armed at 1.5x, 40%@2x then ride to 10x |
    /// | `quick_flip` | 10% stop, break-even at 5% drawdown, all out at 1.5x, 1h time stop |
    /// | `cloud_breakout` | cloud entry, 15% stop, ladder to 4x, one half-size re-entry |
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.insert(
            "balanced",
            StrategyConfig::new(0.2).with_ladder(&[(0.5, 2.0), (0.3, 3.0), (0.2, 5.0)]),
        );
        registry.insert(
            "trailing_runner",
            StrategyConfig::new(0.25)
                .with_trailing(0.3, 1.5)
                .with_ladder(&[(0.4, 2.0)])
                .with_target_multiple(10.0),
        );
        registry.insert(
            "quick_flip",
            StrategyConfig::new(0.1)
                .with_break_even(0.05)
                .with_target_multiple(1.5)
                .with_max_hold(60 * 60)
                .with_tie_break(TieBreakPolicy::OhlcPath),
        );
        registry.insert(
            "cloud_breakout",
            StrategyConfig::new(0.15)
                .with_entry(EntryRule::CloudBreakout {
                    periods: CloudPeriods::default(),
                })
                .with_ladder(&[(0.5, 2.0), (0.5, 4.0)])
                .with_re_entry(ReEntryConfig {
                    enabled: true,
                    max_re_entries: 1,
                    size_fraction: 0.5,
                    recovery_threshold_pct: 0.25,
                    recovery_window_secs: Some(6 * 60 * 60),
                }),
        );
        registry
    }

    /// Add or replace a preset.
    pub fn insert(&mut self, name: impl Into<String>, config: StrategyConfig) {
        self.presets.insert(name.into(), config);
    }

    /// Merge presets from a TOML document of `[name]` tables, each a strategy
    /// config. Entries are validated before anything is inserted. Returns the
    /// number of presets added or replaced.
    pub fn extend_from_toml(&mut self, text: &str) -> Result<usize, ConfigError> {
        let parsed: BTreeMap<String, StrategyConfig> =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        for config in parsed.values() {
            config.compile()?;
        }
        let count = parsed.len();
        self.presets.extend(parsed);
        Ok(count)
    }

    pub fn get(&self, name: &str) -> Result<&StrategyConfig, ConfigError> {
        self.presets
            .get(name)
            .ok_or_else(|| ConfigError::UnknownPreset(name.to_string()))
    }

    pub fn compile(&self, name: &str) -> Result<CompiledStrategy, ConfigError> {
        self.get(name)?.compile()
    }

    /// Names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.presets.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_compiles() {
        let registry = PresetRegistry::builtin();
        assert_eq!(registry.len(), 4);
        for name in registry.names() {
            registry
                .compile(name)
                .unwrap_or_else(|e| panic!("preset {name} failed: {e}"));
        }
    }

    #[test]
    fn builtin_ids_are_distinct() {
        let registry = PresetRegistry::builtin();
        let mut ids: Vec<String> = registry
            .names()
            .into_iter()
            .map(|n| registry.compile(n).unwrap().config_id().0)
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn unknown_name_is_a_config_error() {
        let registry = PresetRegistry::builtin();
        assert_eq!(
            registry.get("moonshot").unwrap_err(),
            ConfigError::UnknownPreset("moonshot".into())
        );
    }

    #[test]
    fn insert_overrides() {
        let mut registry = PresetRegistry::builtin();
        registry.insert("balanced", StrategyConfig::new(0.5).with_target_multiple(2.0));
        assert_eq!(registry.get("balanced").unwrap().stop_loss.initial_pct, 0.5);
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn extend_from_toml_validates_first() {
        let mut registry = PresetRegistry::empty();
        let good = r#"
[tight]
target_multiple = 2.0
[tight.stop_loss]
initial_pct = 0.05
"#;
        assert_eq!(registry.extend_from_toml(good).unwrap(), 1);
        assert_eq!(registry.names(), vec!["tight"]);

        let bad = r#"
[broken]
[broken.stop_loss]
initial_pct = 0.05
"#;
        assert_eq!(
            registry.extend_from_toml(bad),
            Err(ConfigError::MissingExitTarget)
        );
        assert_eq!(registry.len(), 1);
    }
}

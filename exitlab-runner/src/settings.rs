//! Run settings (`exitlab.toml`).
//!
//! ```toml
//! preset = "balanced"          # or an inline [strategy] table
//!
//! [data]
//! cache_dir = "data/candles"
//! base_url = "https://candles.example.com/v1"
//! interval = "5m"
//! rate_limit_ms = 250
//! max_retries = 3
//! offline = false
//!
//! [run]
//! horizon_hours = 24
//! warmup_candles = 0
//! concurrency = 8
//! batch_size = 256
//! ```
//!
//! Every field has a default, so an empty file is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use exitlab_core::config::{CompiledStrategy, ConfigError, StrategyConfig};
use exitlab_core::data::Interval;

use crate::driver::DriverOptions;
use crate::http::HttpOptions;
use crate::presets::PresetRegistry;
use crate::sweep::SweepOptions;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read settings file {path}: {message}")]
    Io { path: String, message: String },

    #[error("settings parse error: {0}")]
    Parse(String),

    #[error("invalid setting: {0}")]
    Invalid(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub cache_dir: PathBuf,
    /// Remote candle API; without it only the cache is used.
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub interval: Interval,
    /// Minimum spacing between remote calls.
    pub rate_limit_ms: u64,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub timeout_secs: u64,
    pub offline: bool,
    /// Seed for `--synthetic` candles.
    pub synthetic_seed: u64,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("data/candles"),
            base_url: None,
            api_key_env: "EXITLAB_API_KEY".into(),
            interval: Interval::FiveMinutes,
            rate_limit_ms: 250,
            max_retries: 3,
            backoff_ms: 500,
            timeout_secs: 30,
            offline: false,
            synthetic_seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub horizon_hours: f64,
    pub warmup_candles: usize,
    pub concurrency: usize,
    pub batch_size: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        let sweep = SweepOptions::default();
        Self {
            horizon_hours: 24.0,
            warmup_candles: 0,
            concurrency: sweep.concurrency,
            batch_size: sweep.batch_size,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub preset: Option<String>,
    pub strategy: Option<StrategyConfig>,
    pub data: DataSettings,
    pub run: RunSettings,
}

impl Settings {
    pub fn from_toml(text: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(text).map_err(|e| SettingsError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|e| SettingsError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml(&text)
    }

    /// Load `path` if given, otherwise defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, SettingsError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.preset.is_some() && self.strategy.is_some() {
            return Err(SettingsError::Invalid(
                "set either `preset` or [strategy], not both".into(),
            ));
        }
        if !(self.run.horizon_hours.is_finite() && self.run.horizon_hours > 0.0) {
            return Err(SettingsError::Invalid(format!(
                "run.horizon_hours must be positive, got {}",
                self.run.horizon_hours
            )));
        }
        if self.run.concurrency == 0 {
            return Err(SettingsError::Invalid("run.concurrency must be at least 1".into()));
        }
        if self.run.batch_size == 0 {
            return Err(SettingsError::Invalid("run.batch_size must be at least 1".into()));
        }
        if self.data.timeout_secs == 0 {
            return Err(SettingsError::Invalid("data.timeout_secs must be at least 1".into()));
        }
        Ok(())
    }

    /// The strategy named by the settings file, if it names one.
    pub fn strategy_config(
        &self,
        registry: &PresetRegistry,
    ) -> Result<Option<StrategyConfig>, SettingsError> {
        if let Some(config) = &self.strategy {
            return Ok(Some(config.clone()));
        }
        match &self.preset {
            Some(name) => Ok(Some(registry.get(name)?.clone())),
            None => Ok(None),
        }
    }

    pub fn compiled_strategy(
        &self,
        registry: &PresetRegistry,
    ) -> Result<Option<CompiledStrategy>, SettingsError> {
        match self.strategy_config(registry)? {
            Some(config) => Ok(Some(config.compile()?)),
            None => Ok(None),
        }
    }

    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            interval: self.data.interval,
            warmup_candles: self.run.warmup_candles,
            horizon_secs: (self.run.horizon_hours * 3_600.0).round() as i64,
        }
    }

    pub fn sweep_options(&self) -> SweepOptions {
        SweepOptions {
            concurrency: self.run.concurrency,
            batch_size: self.run.batch_size,
            retain_records: false,
        }
    }

    /// HTTP options when a remote API is configured. The API key is read from
    /// the configured environment variable.
    pub fn http_options(&self) -> Option<HttpOptions> {
        let base_url = self.data.base_url.as_ref()?;
        let mut options = HttpOptions::new(base_url.clone());
        options.api_key = std::env::var(&self.data.api_key_env).ok();
        options.min_spacing = Duration::from_millis(self.data.rate_limit_ms);
        options.max_retries = self.data.max_retries;
        options.backoff = Duration::from_millis(self.data.backoff_ms);
        options.timeout = Duration::from_secs(self.data.timeout_secs);
        Some(options)
    }
}

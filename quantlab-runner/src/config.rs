//! Serializable run configuration.
//!
//! A run file is TOML with three parts:
//! - `[backtest]`: the engine's `BacktestConfig` (dates, currency, seed, execution, risk)
//! - `[data]`: CSV inputs for bars, symbols, FX and corporate actions
//! - `costs` / `output_dir`: optional cost-profile TOML and the artifact root
//!
//! Environment overrides (`QUANTLAB_SEED`, `QUANTLAB_OUTPUT_DIR`) are applied
//! explicitly through [`RunConfig::apply_env`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use quantlab_core::domain::RunId;
use quantlab_core::engine::BacktestConfig;

pub const ENV_SEED: &str = "QUANTLAB_SEED";
pub const ENV_OUTPUT_DIR: &str = "QUANTLAB_OUTPUT_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// One bars CSV and the exchange whose calendar stamps its rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BarsFile {
    pub path: PathBuf,
    pub exchange: String,
}

/// Input files for a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataPaths {
    pub bars: Vec<BarsFile>,
    pub symbols: PathBuf,
    #[serde(default)]
    pub fx: Option<PathBuf>,
    #[serde(default)]
    pub corporate_actions: Option<PathBuf>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

/// Everything needed to reproduce a backtest from files on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    pub backtest: BacktestConfig,
    pub data: DataPaths,
    /// Venue cost profiles; runs are cost-free without one.
    #[serde(default)]
    pub costs: Option<PathBuf>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl RunConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Apply `QUANTLAB_SEED` / `QUANTLAB_OUTPUT_DIR` from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_SEED) {
            self.backtest.seed = value.trim().parse().map_err(|_| ConfigError::Env {
                var: ENV_SEED,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_OUTPUT_DIR) {
            if value.trim().is_empty() {
                return Err(ConfigError::Env {
                    var: ENV_OUTPUT_DIR,
                    value,
                });
            }
            self.output_dir = PathBuf::from(value);
        }
        Ok(self)
    }

    /// Deterministic ID over the canonical JSON of the whole configuration.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let value =
            serde_json::to_value(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(RunId::from_canonical(&value))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let bt = &self.backtest;
        if bt.start > bt.end {
            return Err(ConfigError::Invalid(format!(
                "start {} is after end {}",
                bt.start, bt.end
            )));
        }
        if bt.initial_cash < 0.0 || !bt.initial_cash.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "initial_cash must be finite and non-negative, got {}",
                bt.initial_cash
            )));
        }
        if bt.spread_bps < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "spread_bps must be non-negative, got {}",
                bt.spread_bps
            )));
        }
        if self.data.bars.is_empty() {
            return Err(ConfigError::Invalid("data.bars is empty".into()));
        }
        Ok(())
    }
}

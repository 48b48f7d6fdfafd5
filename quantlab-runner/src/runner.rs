//! Single-run orchestration: dataset + config + strategy → artifact directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use quantlab_core::calendar::TradingCalendar;
use quantlab_core::domain::RunId;
use quantlab_core::engine::{BacktestConfig, EngineError};
use quantlab_core::strategy::{Strategy, StrategyError};

use crate::artifacts::CsvArtifactWriter;
use crate::config::{ConfigError, RunConfig};
use crate::folds::FoldError;
use crate::loader::{Dataset, LoadError};
use crate::metrics::PerformanceMetrics;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Load(#[from] LoadError),
    #[error("fold error: {0}")]
    Fold(#[from] FoldError),
    #[error("backtest failed: {0}")]
    Engine(#[from] EngineError),
    #[error("strategy construction failed: {0}")]
    Factory(#[from] StrategyError),
    #[error("invalid search: {0}")]
    Search(String),
    #[error(transparent)]
    Artifacts(#[from] anyhow::Error),
}

/// Where a run landed and how it did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub metrics: PerformanceMetrics,
    pub out_dir: PathBuf,
}

/// Run one backtest and write its artifacts into `out_dir`.
pub fn run_to_dir(
    dataset: &Dataset,
    config: BacktestConfig,
    strategy: &mut dyn Strategy,
    out_dir: &Path,
) -> Result<RunOutcome, RunError> {
    let mut writer = CsvArtifactWriter::create(out_dir)?;
    let summary = dataset.backtest(config).run(strategy, &mut writer)?;
    let metrics = writer
        .metrics()
        .cloned()
        .unwrap_or_else(|| PerformanceMetrics::compute(&summary.metrics, &[]));
    Ok(RunOutcome {
        run_id: summary.run_id,
        metrics,
        out_dir: out_dir.to_path_buf(),
    })
}

/// Load the configured data and run under `output_dir/run_{run_id[..12]}`.
pub fn run_from_config(
    config: &RunConfig,
    calendar: Arc<dyn TradingCalendar>,
    strategy: &mut dyn Strategy,
) -> Result<RunOutcome, RunError> {
    let dataset = Dataset::load(config, calendar)?;
    let run_id = dataset.backtest(config.backtest.clone()).run_id(strategy.name());
    let out_dir = config.output_dir.join(format!("run_{}", run_id.short(12)));
    info!(run_id = %run_id, out_dir = %out_dir.display(), "starting run");
    run_to_dir(&dataset, config.backtest.clone(), strategy, &out_dir)
}

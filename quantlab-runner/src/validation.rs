//! Walk-forward validation driver.
//!
//! Runs one backtest per fold over the fold's validation range only, in
//! parallel, each into `fold_{idx:02}_{params_hash}` with seed
//! `base_seed + idx` (1-based). Results come back in fold order and are
//! summarized into `folds_summary.json`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use quantlab_core::domain::RunId;
use quantlab_core::engine::BacktestConfig;
use quantlab_core::strategy::{Strategy, StrategyError};

use crate::artifacts::write_json;
use crate::folds::Fold;
use crate::loader::Dataset;
use crate::metrics::PerformanceMetrics;
use crate::runner::{run_to_dir, RunError};

pub const FOLDS_SUMMARY_JSON: &str = "folds_summary.json";

/// Strategy parameters; keys are kept sorted so hashing is canonical.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// First 8 hex chars of the BLAKE3 hash of the canonical params JSON.
pub fn params_hash(params: &Params) -> String {
    RunId::from_canonical(&serde_json::Value::Object(params.clone()))
        .short(8)
        .to_string()
}

/// Result of one fold's validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldResult {
    pub fold_index: usize,
    pub val_start: DateTime<Utc>,
    pub val_end: DateTime<Utc>,
    pub train_ranges: Vec<(DateTime<Utc>, DateTime<Utc>)>,
    pub metrics: PerformanceMetrics,
    pub run_id: RunId,
    pub out_dir: PathBuf,
}

/// Run every fold for one parameter set.
///
/// `factory` builds a fresh strategy per fold, so strategies need not be
/// `Sync`; the factory itself is shared across threads.
pub fn run_walk_forward<F>(
    factory: &F,
    params: &Params,
    dataset: &Dataset,
    base: &BacktestConfig,
    folds: &[Fold],
    out_dir: &Path,
) -> Result<Vec<FoldResult>, RunError>
where
    F: Fn(&Params) -> Result<Box<dyn Strategy>, StrategyError> + Sync,
{
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let hash = params_hash(params);

    let results = folds
        .par_iter()
        .enumerate()
        .map(|(i, fold)| -> Result<FoldResult, RunError> {
            let idx = i + 1;
            let fold_dir = out_dir.join(format!("fold_{idx:02}_{hash}"));
            let mut config = base.clone();
            config.start = fold.val_range.0;
            config.end = fold.val_range.1;
            config.seed = base.seed.wrapping_add(idx as u64);

            let mut strategy = factory(params)?;
            let outcome = run_to_dir(dataset, config, strategy.as_mut(), &fold_dir)?;
            info!(
                fold = idx,
                run_id = %outcome.run_id,
                ret = outcome.metrics.total_return(),
                "fold complete"
            );
            Ok(FoldResult {
                fold_index: idx,
                val_start: fold.val_range.0,
                val_end: fold.val_range.1,
                train_ranges: fold.train_ranges.clone(),
                metrics: outcome.metrics,
                run_id: outcome.run_id,
                out_dir: outcome.out_dir,
            })
        })
        .collect::<Result<Vec<_>, RunError>>()?;

    write_json(&out_dir.join(FOLDS_SUMMARY_JSON), &results)?;
    Ok(results)
}

//! Hyperparameter search over strategy parameters.
//!
//! Each trial is one parameter set evaluated by the walk-forward driver
//! under `trial_{trial_id}`, where `trial_id` is the 8-char params hash.
//! Trials run in parallel; the leaderboard is sorted by mean fold return
//! (descending, ties by `trial_id`) and written as `leaderboard.csv` and
//! `leaderboard.json`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Context;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use quantlab_core::engine::BacktestConfig;
use quantlab_core::strategy::{Strategy, StrategyError};

use crate::artifacts::write_json;
use crate::folds::Fold;
use crate::loader::Dataset;
use crate::metrics::mean;
use crate::runner::RunError;
use crate::validation::{params_hash, run_walk_forward, FoldResult, Params};

pub const LEADERBOARD_CSV: &str = "leaderboard.csv";
pub const LEADERBOARD_JSON: &str = "leaderboard.json";

// ─── Search space ────────────────────────────────────────────────────

/// One sampled dimension of a random search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RandomDim {
    /// Uniform integer in `[min, max]`.
    Int { min: i64, max: i64 },
    /// Uniform float in `[min, max)`.
    Float { min: f64, max: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SearchSpace {
    Grid {
        grid: BTreeMap<String, Vec<Value>>,
    },
    Random {
        dims: BTreeMap<String, RandomDim>,
        n_trials: usize,
    },
}

impl SearchSpace {
    /// Parameter sets to evaluate; random draws use `seed`.
    pub fn trials(&self, seed: u64) -> Result<Vec<Params>, RunError> {
        match self {
            SearchSpace::Grid { grid } => {
                if grid.is_empty() {
                    return Err(RunError::Search("grid is empty".into()));
                }
                Ok(grid_params(grid))
            }
            SearchSpace::Random { dims, n_trials } => {
                if dims.is_empty() || *n_trials == 0 {
                    return Err(RunError::Search(
                        "random search needs dimensions and n_trials > 0".into(),
                    ));
                }
                random_params(dims, *n_trials, seed)
            }
        }
    }
}

/// Cartesian product over keys in sorted order; the last key varies fastest.
pub fn grid_params(grid: &BTreeMap<String, Vec<Value>>) -> Vec<Params> {
    grid.iter().fold(vec![Params::new()], |acc, (key, values)| {
        acc.iter()
            .flat_map(|partial| {
                values.iter().map(move |v| {
                    let mut next = partial.clone();
                    next.insert(key.clone(), v.clone());
                    next
                })
            })
            .collect()
    })
}

pub fn random_params(
    dims: &BTreeMap<String, RandomDim>,
    n_trials: usize,
    seed: u64,
) -> Result<Vec<Params>, RunError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(n_trials);
    for _ in 0..n_trials {
        let mut params = Params::new();
        for (name, dim) in dims {
            let value = match *dim {
                RandomDim::Int { min, max } if min <= max => Value::from(rng.gen_range(min..=max)),
                RandomDim::Float { min, max } if min < max && min.is_finite() && max.is_finite() => {
                    Value::from(rng.gen_range(min..max))
                }
                _ => {
                    return Err(RunError::Search(format!("empty range for '{name}'")));
                }
            };
            params.insert(name.clone(), value);
        }
        out.push(params);
    }
    Ok(out)
}

// ─── Trials ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialSummary {
    pub mean_return: f64,
    pub mean_num_orders: f64,
    pub num_folds: usize,
}

impl TrialSummary {
    pub fn from_folds(folds: &[FoldResult]) -> Self {
        let returns: Vec<f64> = folds.iter().map(|f| f.metrics.run.total_return).collect();
        let orders: Vec<f64> = folds.iter().map(|f| f.metrics.run.num_orders as f64).collect();
        Self {
            mean_return: mean(&returns),
            mean_num_orders: mean(&orders),
            num_folds: folds.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: String,
    pub params: Params,
    pub fold_results: Vec<FoldResult>,
    pub summary: TrialSummary,
}

#[derive(Serialize)]
struct LeaderboardRow<'a> {
    trial_id: &'a str,
    params: &'a Params,
    summary: &'a TrialSummary,
}

/// Evaluate every trial of `space` over `folds` and write the leaderboard.
///
/// Duplicate parameter sets are evaluated once. Returns trials in
/// leaderboard order.
pub fn run_search<F>(
    factory: &F,
    space: &SearchSpace,
    dataset: &Dataset,
    base: &BacktestConfig,
    folds: &[Fold],
    out_dir: &Path,
) -> Result<Vec<TrialResult>, RunError>
where
    F: Fn(&Params) -> Result<Box<dyn Strategy>, StrategyError> + Sync,
{
    let mut seen = BTreeSet::new();
    let trials: Vec<Params> = space
        .trials(base.seed)?
        .into_iter()
        .filter(|p| seen.insert(params_hash(p)))
        .collect();
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    info!(trials = trials.len(), folds = folds.len(), "starting search");

    let mut results = trials
        .par_iter()
        .map(|params| -> Result<TrialResult, RunError> {
            let trial_id = params_hash(params);
            let trial_dir = out_dir.join(format!("trial_{trial_id}"));
            let fold_results = run_walk_forward(factory, params, dataset, base, folds, &trial_dir)?;
            let summary = TrialSummary::from_folds(&fold_results);
            info!(trial = %trial_id, mean_return = summary.mean_return, "trial complete");
            Ok(TrialResult {
                trial_id,
                params: params.clone(),
                fold_results,
                summary,
            })
        })
        .collect::<Result<Vec<_>, RunError>>()?;

    results.sort_by(|a, b| {
        b.summary
            .mean_return
            .total_cmp(&a.summary.mean_return)
            .then_with(|| a.trial_id.cmp(&b.trial_id))
    });

    write_leaderboard(&results, out_dir)?;
    Ok(results)
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn write_leaderboard(results: &[TrialResult], out_dir: &Path) -> anyhow::Result<()> {
    let names: BTreeSet<&str> = results
        .iter()
        .flat_map(|r| r.params.keys().map(String::as_str))
        .collect();

    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header = vec!["trial_id"];
    header.extend(names.iter().copied());
    header.extend(["mean_return", "mean_num_orders", "num_folds"]);
    wtr.write_record(&header)?;
    for r in results {
        let mut row = vec![r.trial_id.clone()];
        row.extend(names.iter().map(|n| cell(r.params.get(*n))));
        row.push(r.summary.mean_return.to_string());
        row.push(r.summary.mean_num_orders.to_string());
        row.push(r.summary.num_folds.to_string());
        wtr.write_record(&row)?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    let csv_path = out_dir.join(LEADERBOARD_CSV);
    std::fs::write(&csv_path, data)
        .with_context(|| format!("failed to write {}", csv_path.display()))?;

    let rows: Vec<LeaderboardRow<'_>> = results
        .iter()
        .map(|r| LeaderboardRow {
            trial_id: &r.trial_id,
            params: &r.params,
            summary: &r.summary,
        })
        .collect();
    write_json(&out_dir.join(LEADERBOARD_JSON), &rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use quantlab_core::domain::RunId;
    use quantlab_core::engine::RunMetrics;
    use serde_json::json;
    use std::path::PathBuf;

    use crate::metrics::PerformanceMetrics;

    #[test]
    fn grid_is_sorted_key_product() {
        let mut grid = BTreeMap::new();
        grid.insert("slow".to_string(), vec![json!(20), json!(30)]);
        grid.insert("fast".to_string(), vec![json!(5), json!(10)]);
        let trials = grid_params(&grid);
        let pairs: Vec<(i64, i64)> = trials
            .iter()
            .map(|p| (p["fast"].as_i64().unwrap(), p["slow"].as_i64().unwrap()))
            .collect();
        assert_eq!(pairs, vec![(5, 20), (5, 30), (10, 20), (10, 30)]);
    }

    #[test]
    fn grid_with_empty_axis_has_no_trials() {
        let mut grid = BTreeMap::new();
        grid.insert("a".to_string(), vec![json!(1)]);
        grid.insert("b".to_string(), vec![]);
        assert!(grid_params(&grid).is_empty());
    }

    #[test]
    fn random_is_seeded_and_in_range() {
        let mut dims = BTreeMap::new();
        dims.insert("n".to_string(), RandomDim::Int { min: 3, max: 7 });
        dims.insert("x".to_string(), RandomDim::Float { min: 0.5, max: 1.5 });
        let a = random_params(&dims, 20, 11).unwrap();
        let b = random_params(&dims, 20, 11).unwrap();
        assert_eq!(a, b);
        for p in &a {
            let n = p["n"].as_i64().unwrap();
            let x = p["x"].as_f64().unwrap();
            assert!((3..=7).contains(&n));
            assert!((0.5..1.5).contains(&x));
        }
        assert_ne!(a, random_params(&dims, 20, 12).unwrap());
    }

    #[test]
    fn random_rejects_empty_ranges() {
        let mut dims = BTreeMap::new();
        dims.insert("x".to_string(), RandomDim::Float { min: 1.0, max: 1.0 });
        assert!(matches!(random_params(&dims, 1, 0), Err(RunError::Search(_))));
    }

    #[test]
    fn space_parses_from_toml() {
        let grid: SearchSpace =
            toml::from_str("mode = \"grid\"\n[grid]\nfast = [5, 10]\n").unwrap();
        assert_eq!(grid.trials(0).unwrap().len(), 2);

        let random: SearchSpace = toml::from_str(
            "mode = \"random\"\nn_trials = 3\n[dims.fast]\nmode = \"int\"\nmin = 2\nmax = 9\n",
        )
        .unwrap();
        assert_eq!(random.trials(0).unwrap().len(), 3);
    }

    #[test]
    fn empty_spaces_are_errors() {
        let grid = SearchSpace::Grid { grid: BTreeMap::new() };
        assert!(grid.trials(0).is_err());
        let random = SearchSpace::Random { dims: BTreeMap::new(), n_trials: 5 };
        assert!(random.trials(0).is_err());
    }

    fn fold(idx: usize, total_return: f64, num_orders: usize) -> FoldResult {
        let day = Utc.with_ymd_and_hms(2024, 1, idx as u32, 21, 0, 0).unwrap();
        FoldResult {
            fold_index: idx,
            val_start: day,
            val_end: day,
            train_ranges: vec![],
            metrics: PerformanceMetrics {
                run: RunMetrics {
                    total_return,
                    num_orders,
                    ..RunMetrics::default()
                },
                sharpe: 0.0,
                max_drawdown: 0.0,
            },
            run_id: RunId(format!("run{idx}")),
            out_dir: PathBuf::from(format!("fold_{idx:02}")),
        }
    }

    #[test]
    fn summary_averages_fold_metrics() {
        let summary = TrialSummary::from_folds(&[fold(1, 0.10, 4), fold(2, -0.02, 7)]);
        assert!((summary.mean_return - 0.04).abs() < 1e-12);
        assert!((summary.mean_num_orders - 5.5).abs() < 1e-12);
        assert_eq!(summary.num_folds, 2);
    }

    #[test]
    fn empty_trial_summary_is_zero() {
        assert_eq!(TrialSummary::from_folds(&[]), TrialSummary::default());
    }
}

//! Fold generation over the distinct bar timestamps of a window.
//!
//! Two schemes:
//! - **Walk-forward**: a sliding train window followed, after an embargo gap,
//!   by a test window; advances by `step` (default `test_window`).
//! - **Purged k-fold**: contiguous validation blocks; training is everything
//!   else minus an embargo on both sides of the block.
//!
//! Both are computed over indices first and then mapped onto timestamps, so
//! the index forms are what the invariants are tested against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FoldError {
    #[error("train_window and test_window must be > 0 (got {train}, {test})")]
    InvalidWindow { train: usize, test: usize },
    #[error("n_splits must be >= 2, got {0}")]
    InvalidSplits(usize),
    #[error("{n} timestamps cannot form {n_splits} splits")]
    TooFewTimestamps { n: usize, n_splits: usize },
}

// ─── Types ───────────────────────────────────────────────────────────

/// Inclusive index ranges of one fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldIndices {
    pub train: Vec<(usize, usize)>,
    pub val: (usize, usize),
}

/// Inclusive timestamp ranges of one fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub train_ranges: Vec<(DateTime<Utc>, DateTime<Utc>)>,
    pub val_range: (DateTime<Utc>, DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardSpec {
    pub train_window: usize,
    pub test_window: usize,
    /// Defaults to `test_window`.
    #[serde(default)]
    pub step: Option<usize>,
    #[serde(default)]
    pub embargo_fraction: f64,
}

fn default_kfold_embargo() -> f64 {
    0.01
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurgedKFoldSpec {
    pub n_splits: usize,
    #[serde(default = "default_kfold_embargo")]
    pub embargo_fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FoldScheme {
    WalkForward(WalkForwardSpec),
    PurgedKfold(PurgedKFoldSpec),
}

impl FoldScheme {
    pub fn folds(&self, times: &[DateTime<Utc>]) -> Result<Vec<Fold>, FoldError> {
        match self {
            FoldScheme::WalkForward(spec) => walk_forward(times, spec),
            FoldScheme::PurgedKfold(spec) => purged_kfold(times, spec),
        }
    }
}

// ─── Index forms ─────────────────────────────────────────────────────

/// `floor(n × clamp(fraction, 0, 0.5))`.
pub fn embargo_len(n: usize, fraction: f64) -> usize {
    let f = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 0.5) };
    (n as f64 * f).floor() as usize
}

pub fn walk_forward_indices(n: usize, spec: &WalkForwardSpec) -> Result<Vec<FoldIndices>, FoldError> {
    if spec.train_window == 0 || spec.test_window == 0 {
        return Err(FoldError::InvalidWindow {
            train: spec.train_window,
            test: spec.test_window,
        });
    }
    let step = spec.step.filter(|&s| s > 0).unwrap_or(spec.test_window);
    let embargo = embargo_len(n, spec.embargo_fraction);

    let mut folds = Vec::new();
    let mut start = 0;
    loop {
        let train_end = start + spec.train_window - 1;
        let val_start = train_end + 1 + embargo;
        let val_end = val_start + spec.test_window - 1;
        if val_end >= n {
            break;
        }
        folds.push(FoldIndices {
            train: vec![(start, train_end)],
            val: (val_start, val_end),
        });
        start += step;
    }
    Ok(folds)
}

pub fn purged_kfold_indices(n: usize, spec: &PurgedKFoldSpec) -> Result<Vec<FoldIndices>, FoldError> {
    let k = spec.n_splits;
    if k < 2 {
        return Err(FoldError::InvalidSplits(k));
    }
    if n < k {
        return Err(FoldError::TooFewTimestamps { n, n_splits: k });
    }
    let fold_size = (n / k).max(1);
    let embargo = embargo_len(n, spec.embargo_fraction);

    let folds = (0..k)
        .map(|i| {
            let val_start = i * fold_size;
            let val_end = if i == k - 1 { n - 1 } else { ((i + 1) * fold_size - 1).min(n - 1) };

            let mut train = Vec::with_capacity(2);
            if let Some(left_end) = val_start.checked_sub(1 + embargo) {
                train.push((0, left_end));
            }
            let right_start = val_end + 1 + embargo;
            if right_start < n {
                train.push((right_start, n - 1));
            }
            FoldIndices {
                train,
                val: (val_start, val_end),
            }
        })
        .collect();
    Ok(folds)
}

// ─── Timestamp forms ─────────────────────────────────────────────────

fn to_times(times: &[DateTime<Utc>], folds: Vec<FoldIndices>) -> Vec<Fold> {
    folds
        .into_iter()
        .map(|f| Fold {
            train_ranges: f.train.iter().map(|&(a, b)| (times[a], times[b])).collect(),
            val_range: (times[f.val.0], times[f.val.1]),
        })
        .collect()
}

/// Walk-forward folds over sorted distinct timestamps.
pub fn walk_forward(times: &[DateTime<Utc>], spec: &WalkForwardSpec) -> Result<Vec<Fold>, FoldError> {
    Ok(to_times(times, walk_forward_indices(times.len(), spec)?))
}

/// Purged k-fold over sorted distinct timestamps.
pub fn purged_kfold(times: &[DateTime<Utc>], spec: &PurgedKFoldSpec) -> Result<Vec<Fold>, FoldError> {
    Ok(to_times(times, purged_kfold_indices(times.len(), spec)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn wf(train: usize, test: usize, step: Option<usize>, e: f64) -> WalkForwardSpec {
        WalkForwardSpec {
            train_window: train,
            test_window: test,
            step,
            embargo_fraction: e,
        }
    }

    #[test]
    fn walk_forward_basic_layout() {
        let folds = walk_forward_indices(10, &wf(4, 2, None, 0.0)).unwrap();
        assert_eq!(
            folds,
            vec![
                FoldIndices { train: vec![(0, 3)], val: (4, 5) },
                FoldIndices { train: vec![(2, 5)], val: (6, 7) },
                FoldIndices { train: vec![(4, 7)], val: (8, 9) },
            ]
        );
    }

    #[test]
    fn walk_forward_embargo_gap() {
        // embargo = floor(20 * 0.1) = 2
        let folds = walk_forward_indices(20, &wf(5, 3, Some(5), 0.1)).unwrap();
        assert_eq!(folds[0].val, (7, 9));
        assert_eq!(folds[1].train, vec![(5, 9)]);
        assert_eq!(folds[1].val, (12, 14));
        for f in &folds {
            assert_eq!(f.val.0 - f.train[0].1, 3);
        }
    }

    #[test]
    fn walk_forward_rejects_zero_windows() {
        assert!(matches!(
            walk_forward_indices(10, &wf(0, 2, None, 0.0)),
            Err(FoldError::InvalidWindow { .. })
        ));
        assert!(walk_forward_indices(10, &wf(2, 0, None, 0.0)).is_err());
    }

    #[test]
    fn walk_forward_too_short_is_empty() {
        assert!(walk_forward_indices(5, &wf(4, 2, None, 0.0)).unwrap().is_empty());
    }

    #[test]
    fn embargo_is_clamped() {
        assert_eq!(embargo_len(100, 0.9), 50);
        assert_eq!(embargo_len(100, -1.0), 0);
        assert_eq!(embargo_len(100, f64::NAN), 0);
        assert_eq!(embargo_len(99, 0.01), 0);
    }

    #[test]
    fn kfold_last_fold_absorbs_remainder() {
        let spec = PurgedKFoldSpec { n_splits: 3, embargo_fraction: 0.0 };
        let folds = purged_kfold_indices(10, &spec).unwrap();
        assert_eq!(folds[0], FoldIndices { train: vec![(3, 9)], val: (0, 2) });
        assert_eq!(folds[1], FoldIndices { train: vec![(0, 2), (6, 9)], val: (3, 5) });
        assert_eq!(folds[2], FoldIndices { train: vec![(0, 5)], val: (6, 9) });
    }

    #[test]
    fn kfold_purges_embargo_on_both_sides() {
        // embargo = floor(20 * 0.1) = 2
        let spec = PurgedKFoldSpec { n_splits: 4, embargo_fraction: 0.1 };
        let folds = purged_kfold_indices(20, &spec).unwrap();
        assert_eq!(folds[1].val, (5, 9));
        assert_eq!(folds[1].train, vec![(0, 2), (12, 19)]);
    }

    #[test]
    fn kfold_validation_errors() {
        let one = PurgedKFoldSpec { n_splits: 1, embargo_fraction: 0.0 };
        assert_eq!(purged_kfold_indices(10, &one), Err(FoldError::InvalidSplits(1)));
        let five = PurgedKFoldSpec { n_splits: 5, embargo_fraction: 0.0 };
        assert_eq!(
            purged_kfold_indices(3, &five),
            Err(FoldError::TooFewTimestamps { n: 3, n_splits: 5 })
        );
    }

    #[test]
    fn scheme_maps_onto_timestamps() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap();
        let times: Vec<_> = (0..6).map(|d| t0 + Duration::days(d)).collect();
        let scheme: FoldScheme =
            toml::from_str("type = \"walk_forward\"\ntrain_window = 2\ntest_window = 2\n").unwrap();
        let folds = scheme.folds(&times).unwrap();
        assert_eq!(folds.len(), 2);
        assert_eq!(folds[0].train_ranges, vec![(times[0], times[1])]);
        assert_eq!(folds[0].val_range, (times[2], times[3]));
        assert_eq!(folds[1].val_range, (times[4], times[5]));
    }

    #[test]
    fn kfold_embargo_defaults_to_one_percent() {
        let scheme: FoldScheme = toml::from_str("type = \"purged_kfold\"\nn_splits = 3\n").unwrap();
        assert_eq!(
            scheme,
            FoldScheme::PurgedKfold(PurgedKFoldSpec { n_splits: 3, embargo_fraction: 0.01 })
        );
    }
}

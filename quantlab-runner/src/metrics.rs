//! Performance metrics: pure functions over an equity curve.
//!
//! The driver reports start/final equity, return and order/fill counts; the
//! runner adds annualized Sharpe and maximum drawdown on top.

use serde::{Deserialize, Serialize};

use quantlab_core::engine::RunMetrics;

const PERIODS_PER_YEAR: f64 = 252.0;

/// Driver metrics plus curve statistics, as written to `metrics.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    #[serde(flatten)]
    pub run: RunMetrics,
    pub sharpe: f64,
    pub max_drawdown: f64,
}

impl PerformanceMetrics {
    pub fn compute(run: &RunMetrics, equity_curve: &[f64]) -> Self {
        Self {
            run: run.clone(),
            sharpe: sharpe_ratio(equity_curve),
            max_drawdown: max_drawdown(equity_curve),
        }
    }

    pub fn total_return(&self) -> f64 {
        self.run.total_return
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Annualized Sharpe ratio of per-snapshot returns, zero risk-free rate.
///
/// Returns 0.0 with fewer than two returns or zero variance.
pub fn sharpe_ratio(equity_curve: &[f64]) -> f64 {
    let returns = period_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let std = std_dev(&returns);
    if std < 1e-15 {
        return 0.0;
    }
    mean(&returns) / std * PERIODS_PER_YEAR.sqrt()
}

/// Largest peak-to-trough decline as a negative fraction (0.0 if none).
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let Some(&first) = equity_curve.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        peak = peak.max(eq);
        if peak > 0.0 {
            max_dd = max_dd.min((eq - peak) / peak);
        }
    }
    max_dd
}

pub fn period_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

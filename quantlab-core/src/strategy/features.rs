//! Rolling feature helpers for strategies.
//!
//! Every function returns one slot per input; slots before the first full
//! window are `None`. Standard deviations are population deviations.

use super::StrategyError;

fn check_window(window: usize) -> Result<(), StrategyError> {
    if window == 0 {
        return Err(StrategyError::Invalid("window must be positive".into()));
    }
    Ok(())
}

fn rolling<F>(values: &[f64], window: usize, f: F) -> Result<Vec<Option<f64>>, StrategyError>
where
    F: Fn(&[f64]) -> f64,
{
    check_window(window)?;
    Ok((0..values.len())
        .map(|i| (i + 1 >= window).then(|| f(&values[i + 1 - window..=i])))
        .collect())
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn pstdev(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let m = mean(xs);
    (xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64).sqrt()
}

pub fn rolling_mean(values: &[f64], window: usize) -> Result<Vec<Option<f64>>, StrategyError> {
    rolling(values, window, mean)
}

/// Z-score of the newest value against its window; a flat window divides by 1e-12.
pub fn zscore(values: &[f64], window: usize) -> Result<Vec<Option<f64>>, StrategyError> {
    rolling(values, window, |w| {
        let s = pstdev(w);
        let s = if s == 0.0 { 1e-12 } else { s };
        (w[w.len() - 1] - mean(w)) / s
    })
}

pub fn rolling_vol(values: &[f64], window: usize) -> Result<Vec<Option<f64>>, StrategyError> {
    rolling(values, window, pstdev)
}

/// Average true range over `window` bars. The first bar's true range is
/// its high-low range.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], window: usize) -> Result<Vec<Option<f64>>, StrategyError> {
    if high.len() != low.len() || low.len() != close.len() {
        return Err(StrategyError::Invalid("high, low and close must have the same length".into()));
    }
    check_window(window)?;
    let tr: Vec<f64> = (0..close.len())
        .map(|i| {
            let range = high[i] - low[i];
            if i == 0 {
                range
            } else {
                let prev = close[i - 1];
                range.max((high[i] - prev).abs()).max((low[i] - prev).abs())
            }
        })
        .collect();
    rolling(&tr, window, mean)
}

/// Leverage that scales realized volatility to `target_annual_vol`.
pub fn vol_target(
    returns: &[f64],
    target_annual_vol: f64,
    window: usize,
    periods_per_year: u32,
) -> Result<Vec<Option<f64>>, StrategyError> {
    if window <= 1 {
        return Err(StrategyError::Invalid("vol_target window must be greater than 1".into()));
    }
    let annualizer = f64::from(periods_per_year).sqrt();
    rolling(returns, window, |w| {
        let s = pstdev(w);
        let s = if s == 0.0 { 1e-12 } else { s };
        target_annual_vol / (s * annualizer)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_mean_warms_up() {
        let out = rolling_mean(&[1.0, 2.0, 3.0, 4.0], 2).unwrap();
        assert_eq!(out, vec![None, Some(1.5), Some(2.5), Some(3.5)]);
    }

    #[test]
    fn zero_window_rejected() {
        assert!(rolling_mean(&[1.0], 0).is_err());
        assert!(atr(&[1.0], &[1.0], &[1.0], 0).is_err());
    }

    #[test]
    fn window_longer_than_input_is_all_none() {
        assert_eq!(rolling_vol(&[1.0, 2.0], 5).unwrap(), vec![None, None]);
    }

    #[test]
    fn zscore_of_flat_series_is_zero() {
        let out = zscore(&[5.0, 5.0, 5.0], 3).unwrap();
        assert_eq!(out[2], Some(0.0));
        let out = zscore(&[1.0, 2.0, 3.0], 3).unwrap();
        // mean 2, pstdev sqrt(2/3)
        assert!((out[2].unwrap() - 1.0 / (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn atr_uses_previous_close() {
        let high = [10.0, 12.0, 11.0];
        let low = [9.0, 11.0, 10.0];
        let close = [9.5, 11.5, 10.5];
        // TRs: 1.0, max(1, 2.5, 1.5) = 2.5, max(1, 0.5, 1.5) = 1.5
        let out = atr(&high, &low, &close, 2).unwrap();
        assert_eq!(out[0], None);
        assert!((out[1].unwrap() - 1.75).abs() < 1e-12);
        assert!((out[2].unwrap() - 2.0).abs() < 1e-12);
        assert!(atr(&high, &low[..2], &close, 2).is_err());
    }

    #[test]
    fn vol_target_leverage() {
        assert!(vol_target(&[0.01, 0.02], 0.1, 1, 252).is_err());
        let rets = [0.01, -0.01, 0.01, -0.01];
        let out = vol_target(&rets, 0.1, 2, 252).unwrap();
        // pstdev of (0.01, -0.01) is 0.01
        let expected = 0.1 / (0.01 * 252f64.sqrt());
        assert!((out[1].unwrap() - expected).abs() < 1e-9);
    }
}

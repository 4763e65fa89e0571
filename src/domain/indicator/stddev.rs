//! Population standard deviation helpers.
//!
//! STDDEV(x) = sqrt(sum((x[j] - mean(x))^2) / n)
//!
//! Shared by the Bollinger bands (over closes) and the MACD vote strength
//! (over the histogram).

use crate::domain::ohlcv::OhlcvBar;

/// (mean, population stddev) of `values`. Both are 0.0 for an empty slice.
pub(crate) fn mean_stddev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|v| {
            let diff = v - mean;
            diff * diff
        })
        .sum::<f64>()
        / n;
    (mean, variance.sqrt())
}

/// (mean, population stddev) of the closes in `window`.
pub(crate) fn window_mean_stddev(window: &[OhlcvBar]) -> (f64, f64) {
    let closes: Vec<f64> = window.iter().map(|b| b.close).collect();
    mean_stddev(&closes)
}

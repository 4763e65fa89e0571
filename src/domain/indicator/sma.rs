//! Simple Moving Average of closing prices.
//!
//! SMA(n)[i] = mean(C[i-n+1..=i]), maintained as a running window sum.
//! Warmup: first (n-1) bars are invalid.

use crate::domain::error::DataError;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_sma(bars: &[OhlcvBar], period: usize) -> Result<IndicatorSeries, DataError> {
    let indicator_type = IndicatorType::Sma(period);
    indicator_type.require(bars.len())?;
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

    Ok(IndicatorSeries {
        values: rolling_mean(bars, &closes, period),
        indicator_type,
    })
}

/// Rolling mean of `inputs`, aligned to `bars`. Shared with the volume average.
pub(crate) fn rolling_mean(bars: &[OhlcvBar], inputs: &[f64], period: usize) -> Vec<IndicatorPoint> {
    let mut values = Vec::with_capacity(bars.len());
    let mut sum = 0.0;

    for (i, bar) in bars.iter().enumerate() {
        sum += inputs[i];
        if i >= period {
            sum -= inputs[i - period];
        }

        let valid = period > 0 && i + 1 >= period;
        let value = if valid { sum / period as f64 } else { 0.0 };
        values.push(IndicatorPoint {
            date: bar.date,
            valid,
            value: IndicatorValue::Simple(value),
        });
    }

    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn make_bars(prices: &[f64]) -> Vec<OhlcvBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &close)| OhlcvBar {
                symbol: "TEST.NS".into(),
                date: start + Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000,
            })
            .collect()
    }

    #[test]
    fn sma_warmup() {
        let bars = make_bars(&[10.0, 20.0, 30.0, 40.0]);
        let series = calculate_sma(&bars, 3).unwrap();

        assert!(!series.values[0].valid);
        assert!(!series.values[1].valid);
        assert!(series.values[2].valid);
        assert!(series.values[3].valid);
    }

    #[test]
    fn sma_rolling_values() {
        let bars = make_bars(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        let series = calculate_sma(&bars, 3).unwrap();

        assert!((series.simple_at(2).unwrap() - 20.0).abs() < 1e-10);
        assert!((series.simple_at(3).unwrap() - 30.0).abs() < 1e-10);
        assert!((series.simple_at(4).unwrap() - 40.0).abs() < 1e-10);
    }

    #[test]
    fn sma_insufficient_history() {
        let bars = make_bars(&[10.0, 20.0]);
        let err = calculate_sma(&bars, 3).unwrap_err();
        assert!(matches!(
            err,
            DataError::InsufficientData {
                bars: 2,
                minimum: 3,
                ..
            }
        ));
    }

    #[test]
    fn sma_indicator_type() {
        let bars = make_bars(&[10.0; 5]);
        let series = calculate_sma(&bars, 5).unwrap();
        assert_eq!(series.indicator_type, IndicatorType::Sma(5));
        assert_eq!(series.len(), 5);
    }
}

//! Exponential Moving Average indicator.
//!
//! k = 2/(n+1), seed with first SMA, then EMA[i] = C[i]*k + EMA[i-1]*(1-k).
//! Warmup: first (n-1) bars are invalid.

use crate::domain::error::DataError;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_ema(bars: &[OhlcvBar], period: usize) -> Result<IndicatorSeries, DataError> {
    let indicator_type = IndicatorType::Ema(period);
    indicator_type.require(bars.len())?;

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let raw = ema_raw(&closes, period);

    let values = bars
        .iter()
        .zip(raw)
        .enumerate()
        .map(|(i, (bar, ema))| IndicatorPoint {
            date: bar.date,
            valid: period > 0 && i + 1 >= period,
            value: IndicatorValue::Simple(ema),
        })
        .collect();

    Ok(IndicatorSeries {
        indicator_type,
        values,
    })
}

/// EMA over arbitrary inputs, 0.0 for warmup positions.
pub(crate) fn ema_raw(inputs: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![0.0; inputs.len()];
    if period == 0 {
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = 0.0;
    let mut sum = 0.0;

    for (i, &input) in inputs.iter().enumerate() {
        if i < period - 1 {
            sum += input;
        } else if i == period - 1 {
            sum += input;
            ema = sum / period as f64;
            out[i] = ema;
        } else {
            ema = input * k + ema * (1.0 - k);
            out[i] = ema;
        }
    }

    out
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
    fn ema_warmup() {
        let bars = make_bars(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        let series = calculate_ema(&bars, 3).unwrap();

        assert!(!series.values[0].valid);
        assert!(!series.values[1].valid);
        assert!(series.values[2].valid);
        assert!(series.values[3].valid);
        assert!(series.values[4].valid);
    }

    #[test]
    fn ema_seed_is_sma() {
        let bars = make_bars(&[10.0, 20.0, 30.0]);
        let series = calculate_ema(&bars, 3).unwrap();

        let expected_sma = (10.0 + 20.0 + 30.0) / 3.0;
        assert!((series.simple_at(2).unwrap() - expected_sma).abs() < f64::EPSILON);
    }

    #[test]
    fn ema_recursive_calculation() {
        let bars = make_bars(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        let series = calculate_ema(&bars, 3).unwrap();

        let k = 2.0 / 4.0;
        let sma = (10.0 + 20.0 + 30.0) / 3.0;
        let ema_3 = 40.0 * k + sma * (1.0 - k);
        let ema_4 = 50.0 * k + ema_3 * (1.0 - k);

        assert!((series.simple_at(3).unwrap() - ema_3).abs() < f64::EPSILON);
        assert!((series.simple_at(4).unwrap() - ema_4).abs() < f64::EPSILON);
    }

    #[test]
    fn ema_equal_prices() {
        let bars = make_bars(&[100.0; 5]);
        let series = calculate_ema(&bars, 3).unwrap();

        for i in 2..5 {
            assert!((series.simple_at(i).unwrap() - 100.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn ema_insufficient_history() {
        let bars = make_bars(&[10.0, 20.0]);
        assert!(calculate_ema(&bars, 21).is_err());
    }

    #[test]
    fn ema_raw_zero_period_is_all_zero() {
        assert_eq!(ema_raw(&[1.0, 2.0], 0), vec![0.0, 0.0]);
    }
}

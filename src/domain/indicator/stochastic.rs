//! Stochastic oscillator.
//!
//! %K[i] = 100 × (C[i] - LL) / (HH - LL) over the last k bars, 50 when the
//! range is flat. %D is the d-period mean of %K.
//! Warmup: first (k + d - 2) bars are invalid.

use crate::domain::error::DataError;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_stochastic(
    bars: &[OhlcvBar],
    k_period: usize,
    d_period: usize,
) -> Result<IndicatorSeries, DataError> {
    let indicator_type = IndicatorType::Stochastic { k_period, d_period };
    indicator_type.require(bars.len())?;
    let k_period = k_period.max(1);
    let d_period = d_period.max(1);

    let k_values: Vec<f64> = (0..bars.len())
        .map(|i| {
            if i + 1 < k_period {
                return 0.0;
            }
            let window = &bars[i + 1 - k_period..=i];
            let highest = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
            let lowest = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
            let range = highest - lowest;
            if range <= 0.0 {
                50.0
            } else {
                100.0 * (bars[i].close - lowest) / range
            }
        })
        .collect();

    let first_valid = k_period + d_period - 2;
    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let valid = i >= first_valid;
            let (k, d) = if valid {
                let d = k_values[i + 1 - d_period..=i].iter().sum::<f64>() / d_period as f64;
                (k_values[i], d)
            } else {
                (0.0, 0.0)
            };
            IndicatorPoint {
                date: bar.date,
                valid,
                value: IndicatorValue::Stochastic { k, d },
            }
        })
        .collect();

    Ok(IndicatorSeries {
        indicator_type,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn make_bars(hlc: &[(f64, f64, f64)]) -> Vec<OhlcvBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        hlc.iter()
            .enumerate()
            .map(|(i, &(high, low, close))| OhlcvBar {
                symbol: "TEST.NS".into(),
                date: start + Duration::days(i as i64),
                open: close,
                high,
                low,
                close,
                volume: 1000,
            })
            .collect()
    }

    fn kd(value: IndicatorValue) -> (f64, f64) {
        match value {
            IndicatorValue::Stochastic { k, d } => (k, d),
            other => panic!("Expected Stochastic value, got {:?}", other),
        }
    }

    #[test]
    fn stochastic_warmup() {
        let bars = make_bars(&[(12.0, 8.0, 10.0); 6]);
        let series = calculate_stochastic(&bars, 3, 2).unwrap();

        assert!(!series.values[2].valid);
        assert!(series.values[3].valid);
    }

    #[test]
    fn stochastic_close_at_high_is_100() {
        let bars = make_bars(&[(10.0, 5.0, 6.0), (12.0, 6.0, 11.0), (15.0, 9.0, 15.0)]);
        let series = calculate_stochastic(&bars, 3, 1).unwrap();
        let (k, d) = kd(series.valid_at(2).unwrap());
        assert!((k - 100.0).abs() < 1e-10);
        assert!((d - 100.0).abs() < 1e-10);
    }

    #[test]
    fn stochastic_flat_range_is_midpoint() {
        let bars = make_bars(&[(10.0, 10.0, 10.0); 4]);
        let series = calculate_stochastic(&bars, 3, 2).unwrap();
        let (k, d) = kd(series.valid_at(3).unwrap());
        assert!((k - 50.0).abs() < 1e-10);
        assert!((d - 50.0).abs() < 1e-10);
    }

    #[test]
    fn stochastic_d_is_mean_of_k() {
        let bars = make_bars(&[
            (10.0, 0.0, 5.0),
            (10.0, 0.0, 10.0),
            (10.0, 0.0, 0.0),
            (10.0, 0.0, 2.0),
        ]);
        let series = calculate_stochastic(&bars, 1, 2).unwrap();
        let (k, d) = kd(series.valid_at(3).unwrap());
        assert!((k - 20.0).abs() < 1e-10);
        assert!((d - 10.0).abs() < 1e-10);
    }
}

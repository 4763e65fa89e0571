//! Technical indicator implementations.
//!
//! This module provides types for representing indicator values and series:
//! - `IndicatorPoint`: A single point in an indicator time series
//! - `IndicatorValue`: Enum for different indicator output shapes
//! - `IndicatorType`: Enum for indicator identity + parameters
//! - `IndicatorSeries`: A time series of indicator values aligned to its bars
//!
//! Every calculator fails with [`DataError::InsufficientData`] when the bar
//! slice is shorter than its lookback. Points inside the warmup window are
//! flagged `valid: false` and carry no meaningful value.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod stddev;
pub mod stochastic;
pub mod volume;

pub use atr::calculate_atr;
pub use bollinger::calculate_bollinger;
pub use ema::calculate_ema;
pub use macd::calculate_macd;
pub use rsi::calculate_rsi;
pub use sma::calculate_sma;
pub(crate) use stddev::mean_stddev;
pub use stochastic::calculate_stochastic;
pub use volume::calculate_volume_sma;

use chrono::NaiveDate;
use std::fmt;

use crate::domain::error::DataError;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub valid: bool,
    pub value: IndicatorValue,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Macd {
        line: f64,
        signal: f64,
        histogram: f64,
    },
    Stochastic {
        k: f64,
        d: f64,
    },
    Bollinger {
        upper: f64,
        middle: f64,
        lower: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    Atr(usize),
    VolumeSma(usize),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Stochastic {
        k_period: usize,
        d_period: usize,
    },
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
}

impl IndicatorType {
    /// Minimum number of bars needed before the first valid point.
    pub fn lookback(&self) -> usize {
        match self {
            IndicatorType::Sma(period)
            | IndicatorType::Ema(period)
            | IndicatorType::Atr(period)
            | IndicatorType::VolumeSma(period) => *period,
            IndicatorType::Rsi(period) => period + 1,
            IndicatorType::Macd { slow, signal, .. } => (slow + signal).saturating_sub(1),
            IndicatorType::Stochastic { k_period, d_period } => {
                (k_period + d_period).saturating_sub(1)
            }
            IndicatorType::Bollinger { period, .. } => *period,
        }
        .max(1)
    }

    /// Fail with `InsufficientData` if `bars` cannot fill the lookback window.
    pub fn require(&self, bars: usize) -> Result<(), DataError> {
        let minimum = self.lookback();
        if bars < minimum {
            return Err(DataError::InsufficientData {
                indicator: self.to_string(),
                bars,
                minimum,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// The value at `index` if it is past the warmup window.
    pub fn valid_at(&self, index: usize) -> Option<IndicatorValue> {
        self.values
            .get(index)
            .filter(|point| point.valid)
            .map(|point| point.value)
    }

    /// Scalar value at `index`, for single-output indicators.
    pub fn simple_at(&self, index: usize) -> Option<f64> {
        match self.valid_at(index)? {
            IndicatorValue::Simple(v) => Some(v),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::VolumeSma(period) => write!(f, "VOLUME_SMA({})", period),
            IndicatorType::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
            IndicatorType::Stochastic { k_period, d_period } => {
                write!(f, "STOCHASTIC({},{})", k_period, d_period)
            }
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => {
                let mult = *stddev_mult_x100 as f64 / 100.0;
                write!(f, "BOLLINGER({},{})", period, mult)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_type_display_sma() {
        assert_eq!(IndicatorType::Sma(20).to_string(), "SMA(20)");
    }

    #[test]
    fn indicator_type_display_macd() {
        let macd = IndicatorType::Macd {
            fast: 12,
            slow: 26,
            signal: 9,
        };
        assert_eq!(macd.to_string(), "MACD(12,26,9)");
    }

    #[test]
    fn indicator_type_display_bollinger() {
        let boll = IndicatorType::Bollinger {
            period: 20,
            stddev_mult_x100: 200,
        };
        assert_eq!(boll.to_string(), "BOLLINGER(20,2)");
    }

    #[test]
    fn lookback_per_indicator() {
        assert_eq!(IndicatorType::Sma(50).lookback(), 50);
        assert_eq!(IndicatorType::Rsi(14).lookback(), 15);
        assert_eq!(
            IndicatorType::Macd {
                fast: 12,
                slow: 26,
                signal: 9
            }
            .lookback(),
            34
        );
        assert_eq!(
            IndicatorType::Stochastic {
                k_period: 14,
                d_period: 3
            }
            .lookback(),
            16
        );
        assert_eq!(IndicatorType::Sma(0).lookback(), 1);
    }

    #[test]
    fn require_reports_shortfall() {
        let err = IndicatorType::Sma(50).require(49).unwrap_err();
        assert_eq!(
            err,
            DataError::InsufficientData {
                indicator: "SMA(50)".into(),
                bars: 49,
                minimum: 50,
            }
        );
        assert!(IndicatorType::Sma(50).require(50).is_ok());
    }

    #[test]
    fn valid_at_skips_warmup() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let series = IndicatorSeries {
            indicator_type: IndicatorType::Sma(2),
            values: vec![
                IndicatorPoint {
                    date,
                    valid: false,
                    value: IndicatorValue::Simple(0.0),
                },
                IndicatorPoint {
                    date: date.succ_opt().unwrap(),
                    valid: true,
                    value: IndicatorValue::Simple(5.0),
                },
            ],
        };
        assert_eq!(series.simple_at(0), None);
        assert_eq!(series.simple_at(1), Some(5.0));
        assert_eq!(series.simple_at(2), None);
    }
}

//! Per-instrument data prepared for a run, and the unified timeline.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;

use crate::domain::error::DataError;
use crate::domain::ohlcv::{OhlcvBar, validate_series};
use crate::domain::signal::{IndicatorFrame, IndicatorSettings};

/// Per-instrument lifecycle: scanning for an entry, or holding a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentState {
    Scanning,
    PositionOpen,
}

#[derive(Debug, Clone)]
pub struct InstrumentData {
    pub symbol: String,
    pub bars: Vec<OhlcvBar>,
    pub frame: IndicatorFrame,
    pub date_index: HashMap<NaiveDate, usize>,
}

impl InstrumentData {
    /// Validate the series and compute its indicator frame.
    pub fn prepare(
        symbol: &str,
        bars: Vec<OhlcvBar>,
        settings: &IndicatorSettings,
    ) -> Result<Self, DataError> {
        validate_series(symbol, &bars)?;
        let frame = IndicatorFrame::compute(&bars, settings)?;
        let date_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        Ok(InstrumentData {
            symbol: symbol.to_string(),
            bars,
            frame,
            date_index,
        })
    }

    pub fn get_bar_index(&self, date: NaiveDate) -> Option<usize> {
        self.date_index.get(&date).copied()
    }

    pub fn get_bar(&self, date: NaiveDate) -> Option<&OhlcvBar> {
        self.get_bar_index(date).map(|i| &self.bars[i])
    }

    pub fn last_bar(&self) -> Option<&OhlcvBar> {
        self.bars.last()
    }
}

pub fn build_unified_timeline(instruments: &[InstrumentData]) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = instruments
        .iter()
        .flat_map(|inst| inst.bars.iter().map(|bar| bar.date))
        .collect();
    unique_dates.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn small_settings() -> IndicatorSettings {
        IndicatorSettings {
            rsi_period: 2,
            macd_fast: 2,
            macd_slow: 3,
            macd_signal: 2,
            bollinger_period: 2,
            sma_short: 2,
            sma_long: 3,
            ema_short: 2,
            ema_long: 3,
            volume_period: 2,
            stochastic_k: 2,
            stochastic_d: 2,
            atr_period: 2,
            ..IndicatorSettings::default()
        }
    }

    fn make_bars(symbol: &str, start: &str, step_days: i64, count: usize) -> Vec<OhlcvBar> {
        let start = NaiveDate::parse_from_str(start, "%Y-%m-%d").unwrap();
        (0..count)
            .map(|i| {
                let close = 100.0 + i as f64;
                OhlcvBar {
                    symbol: symbol.to_string(),
                    date: start + Duration::days(i as i64 * step_days),
                    open: close - 1.0,
                    high: close + 1.0,
                    low: close - 2.0,
                    close,
                    volume: 1000,
                }
            })
            .collect()
    }

    #[test]
    fn prepare_builds_date_index() {
        let data = InstrumentData::prepare(
            "INFY.NS",
            make_bars("INFY.NS", "2024-01-01", 1, 6),
            &small_settings(),
        )
        .unwrap();

        assert_eq!(data.bars.len(), 6);
        assert_eq!(
            data.get_bar_index(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()),
            Some(2)
        );
        let bar = data.get_bar(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()).unwrap();
        assert!((bar.close - 101.0).abs() < f64::EPSILON);
        assert!(
            data.get_bar(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())
                .is_none()
        );
        assert!((data.last_bar().unwrap().close - 105.0).abs() < f64::EPSILON);
    }

    #[test]
    fn prepare_rejects_short_history() {
        let err = InstrumentData::prepare(
            "INFY.NS",
            make_bars("INFY.NS", "2024-01-01", 1, 4),
            &small_settings(),
        )
        .unwrap_err();
        assert!(matches!(err, DataError::InsufficientData { minimum: 5, .. }));
    }

    #[test]
    fn prepare_rejects_unordered_bars() {
        let mut bars = make_bars("INFY.NS", "2024-01-01", 1, 6);
        bars.swap(2, 3);
        let err = InstrumentData::prepare("INFY.NS", bars, &small_settings()).unwrap_err();
        assert!(matches!(err, DataError::UnorderedBars { .. }));
    }

    #[test]
    fn unified_timeline_merges_and_sorts() {
        let settings = small_settings();
        let a = InstrumentData::prepare("A.NS", make_bars("A.NS", "2024-01-02", 2, 5), &settings)
            .unwrap();
        let b = InstrumentData::prepare("B.BO", make_bars("B.BO", "2024-01-01", 3, 5), &settings)
            .unwrap();

        let timeline = build_unified_timeline(&[a, b]);

        // A: 2,4,6,8,10  B: 1,4,7,10,13
        let days: Vec<u32> = timeline.iter().map(|d| chrono::Datelike::day(d)).collect();
        assert_eq!(days, vec![1, 2, 4, 6, 7, 8, 10, 13]);
    }

    #[test]
    fn unified_timeline_empty() {
        assert!(build_unified_timeline(&[]).is_empty());
    }
}

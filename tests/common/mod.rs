#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use swingtrader::domain::config::EngineConfig;
use swingtrader::domain::error::DataError;
pub use swingtrader::domain::ohlcv::OhlcvBar;
use swingtrader::domain::signal::{IndicatorSettings, SignalAggregator, SignalWeights};
use swingtrader::domain::universe::LoadedUniverse;
use swingtrader::ports::data_port::DataPort;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        symbol: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, DataError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(DataError::FetchFailed {
                symbol: symbol.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| start_date.is_none_or(|s| b.date >= s))
                    .filter(|b| end_date.is_none_or(|e| b.date <= e))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, DataError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

pub fn day(offset: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(offset as i64)
}

/// Bars opening at the close with a half-percent range either side.
pub fn make_bars(symbol: &str, closes: &[f64]) -> Vec<OhlcvBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| OhlcvBar {
            symbol: symbol.to_string(),
            date: day(i),
            open: close,
            high: close * 1.005,
            low: close * 0.995,
            close,
            volume: 10_000,
        })
        .collect()
}

/// One percent compounding rise from 100.
pub fn rising(n: usize) -> Vec<f64> {
    (0..n).map(|i| 100.0 * 1.01_f64.powi(i as i32)).collect()
}

pub fn universe_of(entries: &[(&str, Vec<f64>)]) -> LoadedUniverse {
    LoadedUniverse::from_series(
        entries
            .iter()
            .map(|(s, closes)| (s.to_string(), make_bars(s, closes)))
            .collect::<BTreeMap<_, _>>(),
    )
}

/// Short lookbacks with trend-only voting, so a steady rise is a strong buy
/// from the fifth bar.
pub fn small_config() -> EngineConfig {
    EngineConfig {
        indicators: IndicatorSettings {
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
            trend_full_scale: 0.002,
            ..IndicatorSettings::default()
        },
        signals: SignalAggregator::new(SignalWeights {
            rsi: 0.0,
            macd: 0.0,
            bollinger: 0.0,
            sma_trend: 1.0,
            ema_trend: 1.0,
            volume: 0.0,
            stochastic: 0.0,
        }),
        ..EngineConfig::default()
    }
}

/// INI equivalent of [`small_config`].
pub const SMALL_INI: &str = r#"
[backtest]
initial_capital = 100000
symbols = INFY.NS, TCS.NS

[risk]
max_positions = 5

[signals]
weight_rsi = 0
weight_macd = 0
weight_bollinger = 0
weight_sma_trend = 1
weight_ema_trend = 1
weight_volume = 0
weight_stochastic = 0

[indicators]
rsi_period = 2
macd_fast = 2
macd_slow = 3
macd_signal = 2
bollinger_period = 2
sma_short = 2
sma_long = 3
ema_short = 2
ema_long = 3
volume_period = 2
stochastic_k = 2
stochastic_d = 2
atr_period = 2
trend_full_scale = 0.002
"#;

//! Immutable engine configuration, loaded once through [`ConfigPort`].
//!
//! Sections: `[backtest]`, `[risk]`, `[signals]`, `[indicators]`. Every key is
//! optional and falls back to the defaults below. Invalid values are errors,
//! never clamped.

use chrono::NaiveDate;

use crate::domain::backtest::CandidateRanking;
use crate::domain::error::SwingError;
use crate::domain::risk::{RiskConfig, SizingMode, StopMode};
use crate::domain::signal::{IndicatorKind, IndicatorSettings, SignalAggregator, SignalWeights};
use crate::domain::universe::parse_symbols;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub initial_capital: f64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub symbols: Vec<String>,
    pub ranking: CandidateRanking,
    pub min_confidence: f64,
    pub risk: RiskConfig,
    pub signals: SignalAggregator,
    pub indicators: IndicatorSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            initial_capital: 100_000.0,
            start_date: None,
            end_date: None,
            symbols: Vec::new(),
            ranking: CandidateRanking::default(),
            min_confidence: 0.5,
            risk: RiskConfig::default(),
            signals: SignalAggregator::default(),
            indicators: IndicatorSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_port(port: &dyn ConfigPort) -> Result<Self, SwingError> {
        let defaults = EngineConfig::default();
        let config = EngineConfig {
            initial_capital: port.get_double("backtest", "initial_capital", defaults.initial_capital)?,
            start_date: read_date(port, "backtest", "start_date")?,
            end_date: read_date(port, "backtest", "end_date")?,
            symbols: match port.get_string("backtest", "symbols") {
                Some(list) if !list.trim().is_empty() => parse_symbols(&list)?,
                _ => Vec::new(),
            },
            ranking: match port.get_string("backtest", "ranking") {
                Some(raw) => raw.parse().map_err(|reason: String| {
                    SwingError::config_invalid("backtest", "ranking", reason)
                })?,
                None => defaults.ranking,
            },
            min_confidence: port.get_double("signals", "min_confidence", defaults.min_confidence)?,
            risk: read_risk(port, &defaults.risk)?,
            signals: read_signals(port, &defaults.signals)?,
            indicators: read_indicators(port, &defaults.indicators)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SwingError> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(SwingError::config_invalid(
                "backtest",
                "initial_capital",
                "initial_capital must be positive",
            ));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(SwingError::config_invalid(
                    "backtest",
                    "start_date",
                    format!("start_date {} is after end_date {}", start, end),
                ));
            }
        }
        check_unit("signals", "min_confidence", self.min_confidence, true)?;

        validate_risk(&self.risk)?;
        validate_signals(&self.signals)?;
        validate_indicators(&self.indicators)
    }
}

fn read_date(
    port: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDate>, SwingError> {
    match port.get_string(section, key) {
        Some(raw) if !raw.trim().is_empty() => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                SwingError::config_invalid(section, key, format!("expected YYYY-MM-DD, got '{}'", raw))
            }),
        _ => Ok(None),
    }
}

fn read_period(
    port: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, SwingError> {
    let value = port.get_int(section, key, default as i64)?;
    if value < 1 {
        return Err(SwingError::config_invalid(
            section,
            key,
            format!("must be at least 1, got {}", value),
        ));
    }
    Ok(value as usize)
}

fn read_risk(port: &dyn ConfigPort, d: &RiskConfig) -> Result<RiskConfig, SwingError> {
    let s = "risk";
    let stop_mode = match port.get_string(s, "stop_mode").as_deref().map(str::trim) {
        None | Some("percent") => StopMode::Percent,
        Some("atr") => StopMode::Atr {
            multiplier: port.get_double(s, "atr_multiplier", 2.0)?,
        },
        Some(other) => {
            return Err(SwingError::config_invalid(
                s,
                "stop_mode",
                format!("expected 'percent' or 'atr', got '{}'", other),
            ));
        }
    };
    let sizing_mode = match port.get_string(s, "sizing_mode").as_deref().map(str::trim) {
        None | Some("fixed_fractional") => SizingMode::FixedFractional,
        Some("kelly") => SizingMode::Kelly {
            win_rate: port.get_double(s, "kelly_win_rate", 0.5)?,
            payoff_ratio: port.get_double(s, "kelly_payoff_ratio", 2.0)?,
            fraction: port.get_double(s, "kelly_fraction", 0.5)?,
        },
        Some(other) => {
            return Err(SwingError::config_invalid(
                s,
                "sizing_mode",
                format!("expected 'fixed_fractional' or 'kelly', got '{}'", other),
            ));
        }
    };
    let max_holding_days = match port.get_int(s, "max_holding_days", 0)? {
        0 => None,
        days if days > 0 => Some(u32::try_from(days).map_err(|_| {
            SwingError::config_invalid(s, "max_holding_days", "value is too large")
        })?),
        days => {
            return Err(SwingError::config_invalid(
                s,
                "max_holding_days",
                format!("must not be negative, got {}", days),
            ));
        }
    };
    let max_positions = port.get_int(s, "max_positions", d.max_positions as i64)?;
    if max_positions < 1 {
        return Err(SwingError::config_invalid(
            s,
            "max_positions",
            format!("must be at least 1, got {}", max_positions),
        ));
    }

    Ok(RiskConfig {
        risk_per_trade: port.get_double(s, "risk_per_trade", d.risk_per_trade)?,
        max_positions: max_positions as usize,
        max_portfolio_risk: port.get_double(s, "max_portfolio_risk", d.max_portfolio_risk)?,
        cash_reserve_pct: port.get_double(s, "cash_reserve_pct", d.cash_reserve_pct)?,
        max_position_fraction: port.get_double(
            s,
            "max_position_fraction",
            d.max_position_fraction,
        )?,
        stop_loss_pct: port.get_double(s, "stop_loss_pct", d.stop_loss_pct)?,
        take_profit_pct: port.get_double(s, "take_profit_pct", d.take_profit_pct)?,
        trailing_stop_pct: port.get_double(s, "trailing_stop_pct", d.trailing_stop_pct)?,
        min_risk_reward: port.get_double(s, "min_risk_reward", d.min_risk_reward)?,
        stop_mode,
        sizing_mode,
        max_holding_days,
    })
}

fn read_signals(port: &dyn ConfigPort, d: &SignalAggregator) -> Result<SignalAggregator, SwingError> {
    let s = "signals";
    let mut weights = SignalWeights::default();
    for kind in IndicatorKind::ALL {
        let key = format!("weight_{}", kind.to_string().to_lowercase());
        weights.set(kind, port.get_double(s, &key, d.weights.weight(kind))?);
    }

    Ok(SignalAggregator {
        weights,
        buy_threshold: port.get_double(s, "buy_threshold", d.buy_threshold)?,
        strong_threshold: port.get_double(s, "strong_threshold", d.strong_threshold)?,
    })
}

fn read_indicators(
    port: &dyn ConfigPort,
    d: &IndicatorSettings,
) -> Result<IndicatorSettings, SwingError> {
    let s = "indicators";
    let bollinger_stddev =
        port.get_double(s, "bollinger_stddev", d.bollinger_mult_x100 as f64 / 100.0)?;
    if !(bollinger_stddev.is_finite() && bollinger_stddev > 0.0 && bollinger_stddev <= 10.0) {
        return Err(SwingError::config_invalid(
            s,
            "bollinger_stddev",
            format!("must be in (0, 10], got {}", bollinger_stddev),
        ));
    }

    Ok(IndicatorSettings {
        rsi_period: read_period(port, s, "rsi_period", d.rsi_period)?,
        rsi_oversold: port.get_double(s, "rsi_oversold", d.rsi_oversold)?,
        rsi_overbought: port.get_double(s, "rsi_overbought", d.rsi_overbought)?,
        macd_fast: read_period(port, s, "macd_fast", d.macd_fast)?,
        macd_slow: read_period(port, s, "macd_slow", d.macd_slow)?,
        macd_signal: read_period(port, s, "macd_signal", d.macd_signal)?,
        bollinger_period: read_period(port, s, "bollinger_period", d.bollinger_period)?,
        bollinger_mult_x100: (bollinger_stddev * 100.0).round() as u32,
        sma_short: read_period(port, s, "sma_short", d.sma_short)?,
        sma_long: read_period(port, s, "sma_long", d.sma_long)?,
        ema_short: read_period(port, s, "ema_short", d.ema_short)?,
        ema_long: read_period(port, s, "ema_long", d.ema_long)?,
        volume_period: read_period(port, s, "volume_period", d.volume_period)?,
        volume_spike_multiple: port.get_double(s, "volume_spike_multiple", d.volume_spike_multiple)?,
        trend_full_scale: port.get_double(s, "trend_full_scale", d.trend_full_scale)?,
        stochastic_k: read_period(port, s, "stochastic_k", d.stochastic_k)?,
        stochastic_d: read_period(port, s, "stochastic_d", d.stochastic_d)?,
        stochastic_oversold: port.get_double(s, "stochastic_oversold", d.stochastic_oversold)?,
        stochastic_overbought: port.get_double(
            s,
            "stochastic_overbought",
            d.stochastic_overbought,
        )?,
        atr_period: read_period(port, s, "atr_period", d.atr_period)?,
    })
}

/// `value` must lie in (0, 1], or [0, 1] when `allow_zero`.
fn check_unit(section: &str, key: &str, value: f64, allow_zero: bool) -> Result<(), SwingError> {
    let lower_ok = if allow_zero { value >= 0.0 } else { value > 0.0 };
    if !(value.is_finite() && lower_ok && value <= 1.0) {
        let range = if allow_zero { "[0, 1]" } else { "(0, 1]" };
        return Err(SwingError::config_invalid(
            section,
            key,
            format!("must be in {}, got {}", range, value),
        ));
    }
    Ok(())
}

fn check_positive(section: &str, key: &str, value: f64) -> Result<(), SwingError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(SwingError::config_invalid(
            section,
            key,
            format!("must be positive, got {}", value),
        ));
    }
    Ok(())
}

fn check_ordered(section: &str, short_key: &str, short: f64, long_key: &str, long: f64) -> Result<(), SwingError> {
    if short >= long {
        return Err(SwingError::config_invalid(
            section,
            short_key,
            format!("{} ({}) must be less than {} ({})", short_key, short, long_key, long),
        ));
    }
    Ok(())
}

fn validate_risk(risk: &RiskConfig) -> Result<(), SwingError> {
    let s = "risk";
    if !(risk.risk_per_trade.is_finite() && risk.risk_per_trade > 0.0) {
        return Err(SwingError::NonPositiveRiskPct {
            risk_pct: risk.risk_per_trade,
        });
    }
    check_unit(s, "risk_per_trade", risk.risk_per_trade, false)?;
    if risk.max_positions == 0 {
        return Err(SwingError::config_invalid(s, "max_positions", "must be at least 1"));
    }
    check_unit(s, "max_portfolio_risk", risk.max_portfolio_risk, false)?;
    check_unit(s, "max_position_fraction", risk.max_position_fraction, false)?;
    check_unit(s, "cash_reserve_pct", risk.cash_reserve_pct, true)?;
    if risk.cash_reserve_pct >= 1.0 {
        return Err(SwingError::config_invalid(
            s,
            "cash_reserve_pct",
            "a full cash reserve leaves nothing to invest",
        ));
    }
    check_unit(s, "stop_loss_pct", risk.stop_loss_pct, false)?;
    if risk.stop_loss_pct >= 1.0 {
        return Err(SwingError::InvalidStopDistance {
            entry_price: 1.0,
            stop_loss_price: 1.0 - risk.stop_loss_pct,
        });
    }
    check_positive(s, "take_profit_pct", risk.take_profit_pct)?;
    check_unit(s, "trailing_stop_pct", risk.trailing_stop_pct, false)?;
    if risk.trailing_stop_pct >= 1.0 {
        return Err(SwingError::config_invalid(s, "trailing_stop_pct", "must be below 1"));
    }
    if !(risk.min_risk_reward.is_finite() && risk.min_risk_reward >= 0.0) {
        return Err(SwingError::config_invalid(
            s,
            "min_risk_reward",
            format!("must be non-negative, got {}", risk.min_risk_reward),
        ));
    }
    if let StopMode::Atr { multiplier } = risk.stop_mode {
        check_positive(s, "atr_multiplier", multiplier)?;
    }
    if let SizingMode::Kelly {
        win_rate,
        payoff_ratio,
        fraction,
    } = risk.sizing_mode
    {
        check_unit(s, "kelly_win_rate", win_rate, false)?;
        check_positive(s, "kelly_payoff_ratio", payoff_ratio)?;
        check_unit(s, "kelly_fraction", fraction, false)?;
    }
    Ok(())
}

fn validate_signals(signals: &SignalAggregator) -> Result<(), SwingError> {
    let s = "signals";
    let mut total = 0.0;
    for kind in IndicatorKind::ALL {
        let weight = signals.weights.weight(kind);
        if !(weight.is_finite() && weight >= 0.0) {
            return Err(SwingError::config_invalid(
                s,
                &format!("weight_{}", kind.to_string().to_lowercase()),
                format!("must be non-negative, got {}", weight),
            ));
        }
        total += weight;
    }
    if total <= 0.0 {
        return Err(SwingError::config_invalid(
            s,
            "weight_rsi",
            "at least one indicator weight must be positive",
        ));
    }
    check_unit(s, "buy_threshold", signals.buy_threshold, false)?;
    check_unit(s, "strong_threshold", signals.strong_threshold, false)?;
    if signals.buy_threshold > signals.strong_threshold {
        return Err(SwingError::config_invalid(
            s,
            "buy_threshold",
            "buy_threshold must not exceed strong_threshold",
        ));
    }
    Ok(())
}

fn validate_indicators(ind: &IndicatorSettings) -> Result<(), SwingError> {
    let s = "indicators";
    let periods = [
        ("rsi_period", ind.rsi_period),
        ("macd_fast", ind.macd_fast),
        ("macd_slow", ind.macd_slow),
        ("macd_signal", ind.macd_signal),
        ("bollinger_period", ind.bollinger_period),
        ("sma_short", ind.sma_short),
        ("sma_long", ind.sma_long),
        ("ema_short", ind.ema_short),
        ("ema_long", ind.ema_long),
        ("volume_period", ind.volume_period),
        ("stochastic_k", ind.stochastic_k),
        ("stochastic_d", ind.stochastic_d),
        ("atr_period", ind.atr_period),
    ];
    for (key, period) in periods {
        if period == 0 {
            return Err(SwingError::config_invalid(s, key, "must be at least 1"));
        }
    }
    if ind.bollinger_mult_x100 == 0 {
        return Err(SwingError::config_invalid(s, "bollinger_stddev", "must be positive"));
    }

    check_ordered(s, "macd_fast", ind.macd_fast as f64, "macd_slow", ind.macd_slow as f64)?;
    check_ordered(s, "sma_short", ind.sma_short as f64, "sma_long", ind.sma_long as f64)?;
    check_ordered(s, "ema_short", ind.ema_short as f64, "ema_long", ind.ema_long as f64)?;
    check_ordered(s, "rsi_oversold", ind.rsi_oversold, "rsi_overbought", ind.rsi_overbought)?;
    check_ordered(
        s,
        "stochastic_oversold",
        ind.stochastic_oversold,
        "stochastic_overbought",
        ind.stochastic_overbought,
    )?;
    for (key, level) in [
        ("rsi_oversold", ind.rsi_oversold),
        ("rsi_overbought", ind.rsi_overbought),
        ("stochastic_oversold", ind.stochastic_oversold),
        ("stochastic_overbought", ind.stochastic_overbought),
    ] {
        if !(0.0..=100.0).contains(&level) {
            return Err(SwingError::config_invalid(
                s,
                key,
                format!("must be in [0, 100], got {}", level),
            ));
        }
    }
    check_positive(s, "volume_spike_multiple", ind.volume_spike_multiple)?;
    check_positive(s, "trend_full_scale", ind.trend_full_scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapConfig(HashMap<(String, String), String>);

    impl MapConfig {
        fn new(entries: &[(&str, &str, &str)]) -> Self {
            MapConfig(
                entries
                    .iter()
                    .map(|(s, k, v)| ((s.to_string(), k.to_string()), v.to_string()))
                    .collect(),
            )
        }
    }

    impl ConfigPort for MapConfig {
        fn get_string(&self, section: &str, key: &str) -> Option<String> {
            self.0.get(&(section.to_string(), key.to_string())).cloned()
        }
    }

    fn invalid_key(err: SwingError) -> String {
        match err {
            SwingError::ConfigInvalid { key, .. } => key,
            other => panic!("expected ConfigInvalid, got {:?}", other),
        }
    }

    #[test]
    fn empty_config_yields_defaults() {
        let config = EngineConfig::from_port(&MapConfig::new(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.risk.max_positions, 5);
        assert!((config.risk.trailing_stop_pct - 0.04).abs() < f64::EPSILON);
    }

    #[test]
    fn reads_all_sections() {
        let port = MapConfig::new(&[
            ("backtest", "initial_capital", "500000"),
            ("backtest", "start_date", "2023-01-01"),
            ("backtest", "end_date", "2023-12-31"),
            ("backtest", "symbols", "reliance.ns, tcs.ns"),
            ("backtest", "ranking", "symbol"),
            ("risk", "max_positions", "3"),
            ("risk", "stop_mode", "atr"),
            ("risk", "atr_multiplier", "2.5"),
            ("risk", "sizing_mode", "kelly"),
            ("risk", "kelly_win_rate", "0.55"),
            ("risk", "max_holding_days", "20"),
            ("signals", "min_confidence", "0.4"),
            ("signals", "weight_stochastic", "0.5"),
            ("indicators", "rsi_period", "10"),
            ("indicators", "bollinger_stddev", "2.5"),
        ]);
        let config = EngineConfig::from_port(&port).unwrap();

        assert!((config.initial_capital - 500_000.0).abs() < f64::EPSILON);
        assert_eq!(config.start_date, NaiveDate::from_ymd_opt(2023, 1, 1));
        assert_eq!(config.symbols, vec!["RELIANCE.NS", "TCS.NS"]);
        assert_eq!(config.ranking, CandidateRanking::Symbol);
        assert_eq!(config.risk.max_positions, 3);
        assert_eq!(config.risk.stop_mode, StopMode::Atr { multiplier: 2.5 });
        assert!(matches!(
            config.risk.sizing_mode,
            SizingMode::Kelly { win_rate, .. } if (win_rate - 0.55).abs() < 1e-12
        ));
        assert_eq!(config.risk.max_holding_days, Some(20));
        assert!((config.min_confidence - 0.4).abs() < f64::EPSILON);
        assert!((config.signals.weights.stochastic - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.indicators.rsi_period, 10);
        assert_eq!(config.indicators.bollinger_mult_x100, 250);
    }

    #[test]
    fn unparsable_number_is_rejected() {
        let port = MapConfig::new(&[("risk", "stop_loss_pct", "eight")]);
        let err = EngineConfig::from_port(&port).unwrap_err();
        assert_eq!(invalid_key(err), "stop_loss_pct");
    }

    #[test]
    fn non_positive_risk_is_fatal() {
        let port = MapConfig::new(&[("risk", "risk_per_trade", "0")]);
        let err = EngineConfig::from_port(&port).unwrap_err();
        assert!(matches!(err, SwingError::NonPositiveRiskPct { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn full_stop_loss_is_invalid_stop_distance() {
        let port = MapConfig::new(&[("risk", "stop_loss_pct", "1.0")]);
        let err = EngineConfig::from_port(&port).unwrap_err();
        assert!(matches!(err, SwingError::InvalidStopDistance { .. }));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let cases = [
            ("backtest", "initial_capital", "-5", "initial_capital"),
            ("risk", "max_positions", "0", "max_positions"),
            ("risk", "max_portfolio_risk", "1.5", "max_portfolio_risk"),
            ("risk", "cash_reserve_pct", "1", "cash_reserve_pct"),
            ("risk", "stop_mode", "chandelier", "stop_mode"),
            ("risk", "max_holding_days", "-1", "max_holding_days"),
            ("signals", "min_confidence", "1.2", "min_confidence"),
            ("signals", "weight_macd", "-1", "weight_macd"),
            ("signals", "buy_threshold", "0.7", "buy_threshold"),
            ("indicators", "rsi_period", "0", "rsi_period"),
            ("indicators", "macd_fast", "30", "macd_fast"),
            ("indicators", "sma_short", "60", "sma_short"),
            ("indicators", "rsi_oversold", "80", "rsi_oversold"),
            ("indicators", "bollinger_stddev", "0", "bollinger_stddev"),
            ("backtest", "ranking", "random", "ranking"),
        ];
        for (section, key, value, expected) in cases {
            let err = EngineConfig::from_port(&MapConfig::new(&[(section, key, value)])).unwrap_err();
            assert_eq!(invalid_key(err), expected, "[{}] {} = {}", section, key, value);
        }
    }

    #[test]
    fn dates_must_be_ordered() {
        let port = MapConfig::new(&[
            ("backtest", "start_date", "2024-06-01"),
            ("backtest", "end_date", "2024-01-01"),
        ]);
        assert_eq!(invalid_key(EngineConfig::from_port(&port).unwrap_err()), "start_date");

        let port = MapConfig::new(&[("backtest", "start_date", "01/06/2024")]);
        assert_eq!(invalid_key(EngineConfig::from_port(&port).unwrap_err()), "start_date");
    }

    #[test]
    fn all_zero_weights_rejected() {
        let mut config = EngineConfig::default();
        config.signals.weights = SignalWeights {
            rsi: 0.0,
            macd: 0.0,
            bollinger: 0.0,
            sma_trend: 0.0,
            ema_trend: 0.0,
            volume: 0.0,
            stochastic: 0.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_symbol_list_is_universe_error() {
        let port = MapConfig::new(&[("backtest", "symbols", "INFY.NS,MSFT")]);
        let err = EngineConfig::from_port(&port).unwrap_err();
        assert!(matches!(err, SwingError::Universe(_)));
    }
}

//! Domain error types.
//!
//! Data problems skip a single instrument; configuration and degenerate
//! arithmetic abort the run. Limit rejections are not errors at all, see
//! [`crate::domain::risk::LimitDecision`].

use chrono::NaiveDate;

use super::universe::UniverseError;

/// Problems with an instrument's price history. The run continues without
/// the instrument.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataError {
    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error("fetch failed for {symbol}: {reason}")]
    FetchFailed { symbol: String, reason: String },

    #[error("insufficient data for {indicator}: have {bars} bars, need {minimum}")]
    InsufficientData {
        indicator: String,
        bars: usize,
        minimum: usize,
    },

    #[error("bars for {symbol} are not strictly increasing at {date}")]
    UnorderedBars { symbol: String, date: NaiveDate },

    #[error("malformed bar for {symbol} on {date}")]
    MalformedBar { symbol: String, date: NaiveDate },
}

/// Top-level error type for swingtrader.
#[derive(Debug, thiserror::Error)]
pub enum SwingError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Universe(#[from] UniverseError),

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid stop distance: entry {entry_price} must be above stop {stop_loss_price}")]
    InvalidStopDistance {
        entry_price: f64,
        stop_loss_price: f64,
    },

    #[error("risk_pct must be positive and finite, got {risk_pct}")]
    NonPositiveRiskPct { risk_pct: f64 },

    #[error("degenerate arithmetic: {reason}")]
    Degenerate { reason: String },

    #[error("position for {symbol} is already open")]
    DuplicateInstrument { symbol: String },

    #[error("no open position for {symbol}")]
    PositionNotFound { symbol: String },

    #[error("report error: {reason}")]
    Report { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SwingError {
    pub fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        SwingError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn degenerate(reason: impl Into<String>) -> Self {
        SwingError::Degenerate {
            reason: reason.into(),
        }
    }

    /// Configuration problems, including the sizing inputs that can only come
    /// from a bad configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SwingError::ConfigParse { .. }
                | SwingError::Universe(_)
                | SwingError::ConfigInvalid { .. }
                | SwingError::InvalidStopDistance { .. }
                | SwingError::NonPositiveRiskPct { .. }
        )
    }
}

impl From<&SwingError> for std::process::ExitCode {
    fn from(err: &SwingError) -> Self {
        let code: u8 = match err {
            SwingError::Io(_) | SwingError::Report { .. } => 1,
            SwingError::ConfigParse { .. }
            | SwingError::Universe(_)
            | SwingError::ConfigInvalid { .. }
            | SwingError::InvalidStopDistance { .. }
            | SwingError::NonPositiveRiskPct { .. } => 2,
            SwingError::Degenerate { .. } => 3,
            SwingError::DuplicateInstrument { .. } | SwingError::PositionNotFound { .. } => 4,
            SwingError::Data(_) => 5,
        };
        std::process::ExitCode::from(code)
    }
}

//! Market data port trait.

use chrono::NaiveDate;

use crate::domain::error::DataError;
use crate::domain::ohlcv::OhlcvBar;

pub trait DataPort {
    /// Daily bars for `symbol` within `[start_date, end_date]` in ascending
    /// date order. Either bound may be open.
    fn fetch_bars(
        &self,
        symbol: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, DataError>;

    fn list_symbols(&self) -> Result<Vec<String>, DataError>;
}

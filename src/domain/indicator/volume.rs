//! Average traded volume, used for volume-surge confirmation.

use crate::domain::error::DataError;
use crate::domain::indicator::sma::rolling_mean;
use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_volume_sma(
    bars: &[OhlcvBar],
    period: usize,
) -> Result<IndicatorSeries, DataError> {
    let indicator_type = IndicatorType::VolumeSma(period);
    indicator_type.require(bars.len())?;
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();

    Ok(IndicatorSeries {
        values: rolling_mean(bars, &volumes, period),
        indicator_type,
    })
}

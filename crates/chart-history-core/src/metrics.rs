use crate::error::ChartError;
use crate::series::CandleSeries;

/// Drop from open to close of the first candle: `max(open - close, 0)`.
///
/// A rising candle yields `0.0`; the direction of the move is not kept.
/// See [`signed_change`] for the signed variant.
pub fn change(series: &CandleSeries) -> Result<f64, ChartError> {
    let first = series.first().ok_or(ChartError::EmptySeries)?;
    Ok(positive_difference(first.open, first.close))
}

/// `close - open` of the first candle.
pub fn signed_change(series: &CandleSeries) -> Result<f64, ChartError> {
    let first = series.first().ok_or(ChartError::EmptySeries)?;
    Ok(first.close - first.open)
}

fn positive_difference(a: f64, b: f64) -> f64 {
    if a > b { a - b } else { 0.0 }
}

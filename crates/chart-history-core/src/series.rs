use serde::Deserialize;

use crate::candle::Candle;
use crate::error::ChartError;

/// Candles in the order the provider delivered them (ascending `date`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

/// Error body returned by the provider instead of an array,
/// e.g. `{"error":"Invalid currency pair."}`.
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: String,
}

impl CandleSeries {
    /// Decode a JSON array of candle objects.
    /// An empty array is a valid, empty series.
    pub fn decode(bytes: &[u8]) -> Result<Self, ChartError> {
        match serde_json::from_slice::<Vec<Candle>>(bytes) {
            Ok(candles) => Ok(Self { candles }),
            Err(e) => match serde_json::from_slice::<ProviderErrorBody>(bytes) {
                Ok(body) => Err(ChartError::Decode(format!(
                    "provider returned an error instead of candles: {}",
                    body.error
                ))),
                Err(_) => Err(ChartError::Decode(e.to_string())),
            },
        }
    }

    pub fn first(&self) -> Option<&Candle> {
        self.candles.first()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candle> {
        self.candles.iter()
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    /// Data-quality findings. Nothing here rejects the series; the loader
    /// passes upstream data through as delivered.
    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        for (i, c) in self.candles.iter().enumerate() {
            if c.date < 0 {
                issues.push(format!("index {i}: negative date {}", c.date));
            }
            if !(c.high.is_finite() && c.low.is_finite() && c.open.is_finite() && c.close.is_finite())
            {
                issues.push(format!("index {i}: non-finite price"));
            }
            if c.low > c.high {
                issues.push(format!("index {i}: low {} above high {}", c.low, c.high));
            }
        }

        for (i, pair) in self.candles.windows(2).enumerate() {
            if pair[1].date <= pair[0].date {
                issues.push(format!(
                    "index {}: date {} not strictly ascending after {}",
                    i + 1,
                    pair[1].date,
                    pair[0].date
                ));
            }
        }

        issues
    }
}

impl From<Vec<Candle>> for CandleSeries {
    fn from(candles: Vec<Candle>) -> Self {
        Self { candles }
    }
}

impl<'a> IntoIterator for &'a CandleSeries {
    type Item = &'a Candle;
    type IntoIter = std::slice::Iter<'a, Candle>;

    fn into_iter(self) -> Self::IntoIter {
        self.candles.iter()
    }
}

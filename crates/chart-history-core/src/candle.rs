use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// A single 5-minute OHLC candle as returned by `returnChartData`.
///
/// Keys are matched case-insensitively and the last occurrence of a key wins.
/// Absent or `null` fields stay zero; unknown keys are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Candle {
    /// Bucket start, Unix seconds.
    pub date: i64,
    pub high: f32,
    pub low: f32,
    pub open: f64,
    pub close: f64,
    /// Carried for compatibility with stored files; never computed.
    pub change: i64,
}

impl Candle {
    /// Bucket start as a UTC timestamp, or `None` if `date` is out of range.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.date, 0)
    }
}

/// Overwrite `slot` with the next value unless it is `null`.
fn assign<'de, A, T>(map: &mut A, slot: &mut T) -> Result<(), A::Error>
where
    A: MapAccess<'de>,
    T: Deserialize<'de>,
{
    if let Some(value) = map.next_value::<Option<T>>()? {
        *slot = value;
    }
    Ok(())
}

struct CandleVisitor;

impl<'de> Visitor<'de> for CandleVisitor {
    type Value = Candle;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a candle object")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Candle, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut candle = Candle::default();

        while let Some(key) = map.next_key::<String>()? {
            match key.to_ascii_lowercase().as_str() {
                "date" => assign(&mut map, &mut candle.date)?,
                "high" => assign(&mut map, &mut candle.high)?,
                "low" => assign(&mut map, &mut candle.low)?,
                "open" => assign(&mut map, &mut candle.open)?,
                "close" => assign(&mut map, &mut candle.close)?,
                "change" => assign(&mut map, &mut candle.change)?,
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }

        Ok(candle)
    }
}

impl<'de> Deserialize<'de> for Candle {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(CandleVisitor)
    }
}

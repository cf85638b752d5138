use std::fmt;
use std::str::FromStr;

use crate::error::ChartError;

/// Identifies one fetch: a trading pair and a time range in Unix seconds.
///
/// The same key always maps to the same request URL and the same stored file
/// name (`{base}_{quote}_{start}_{end}_`). `start <= end` is the caller's
/// responsibility.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey {
    pub base: String,
    pub quote: String,
    pub start: i64,
    pub end: i64,
}

impl StorageKey {
    pub fn new(base: impl Into<String>, quote: impl Into<String>, start: i64, end: i64) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
            start,
            end,
        }
    }

    /// Build a key from string inputs, as given on a command line.
    pub fn parse(base: &str, quote: &str, start: &str, end: &str) -> Result<Self, ChartError> {
        let key = Self::new(
            base.trim(),
            quote.trim(),
            parse_secs("start", start)?,
            parse_secs("end", end)?,
        );
        key.validate()?;
        Ok(key)
    }

    /// Trading pair in the provider's `BASE_QUOTE` form.
    pub fn pair(&self) -> String {
        format!("{}_{}", self.base, self.quote)
    }

    /// Stored artifact name. The trailing delimiter is part of the name.
    pub fn file_name(&self) -> String {
        format!("{}_{}_{}_{}_", self.base, self.quote, self.start, self.end)
    }

    /// Reject empty symbols and symbols containing the file-name delimiter
    /// or path separators.
    pub fn validate(&self) -> Result<(), ChartError> {
        for (field, symbol) in [("base", &self.base), ("quote", &self.quote)] {
            if symbol.is_empty() {
                return Err(ChartError::InvalidKey(format!("{field} asset is empty")));
            }
            if symbol.contains(['_', '/', '\\']) {
                return Err(ChartError::InvalidKey(format!(
                    "{field} asset '{symbol}' contains a reserved character"
                )));
            }
        }
        Ok(())
    }
}

fn parse_secs(field: &str, value: &str) -> Result<i64, ChartError> {
    value.trim().parse().map_err(|e| {
        ChartError::InvalidKey(format!("{field} time '{value}' is not Unix seconds: {e}"))
    })
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}, {}]", self.pair(), self.start, self.end)
    }
}

impl FromStr for StorageKey {
    type Err = ChartError;

    /// Parse a stored file name back into its key.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let body = name
            .strip_suffix('_')
            .ok_or_else(|| ChartError::InvalidKey(format!("'{name}' lacks trailing '_'")))?;

        let parts: Vec<&str> = body.split('_').collect();
        let [base, quote, start, end] = parts.as_slice() else {
            return Err(ChartError::InvalidKey(format!(
                "'{name}': expected 4 components, got {}",
                parts.len()
            )));
        };

        let key = Self::new(*base, *quote, parse_secs("start", start)?, parse_secs("end", end)?);
        key.validate()?;
        Ok(key)
    }
}

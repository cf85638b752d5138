use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("failed to write {}: {source}", .path.display())]
    StorageWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {}: {source}", .path.display())]
    StorageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Candle series is empty")]
    EmptySeries,

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

impl ChartError {
    /// True when the stored file does not exist, i.e. no fetch ever succeeded.
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            ChartError::StorageRead { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }

    /// True when bytes were present but could not be decoded.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, ChartError::Decode(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn missing_vs_corrupt() {
        let missing = ChartError::StorageRead {
            path: PathBuf::from("x"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(missing.is_missing());
        assert!(!missing.is_corrupt());

        let denied = ChartError::StorageRead {
            path: PathBuf::from("x"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(!denied.is_missing());

        let corrupt = ChartError::Decode("expected array".into());
        assert!(corrupt.is_corrupt());
        assert!(!corrupt.is_missing());
    }

    #[test]
    fn display_includes_path() {
        let err = ChartError::StorageRead {
            path: PathBuf::from("datastore/BTC_XMR_1_2_"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("datastore/BTC_XMR_1_2_"));
    }
}

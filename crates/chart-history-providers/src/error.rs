use chart_history_core::error::ChartError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Provider configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] ChartError),
}

impl ProviderError {
    /// True for failures on the network side of a fetch.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            ProviderError::Http(_) | ProviderError::RateLimited { .. } | ProviderError::Api { .. }
        )
    }
}

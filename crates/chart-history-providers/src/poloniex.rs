use std::time::Duration;

use async_trait::async_trait;
use chart_history_core::key::StorageKey;
use reqwest::Client;
use tracing::debug;

use crate::error::ProviderError;
use crate::provider::ChartSource;

pub const POLONIEX_BASE_URL: &str = "https://poloniex.com";

/// Candle width requested from `returnChartData`, in seconds.
pub const DEFAULT_PERIOD_SECS: u32 = 300;

/// Bound on a whole request. The public API itself imposes none.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Poloniex public chart-data source.
/// No authentication required.
pub struct PoloniexProvider {
    client: Client,
    base_url: String,
    period_secs: u32,
}

impl PoloniexProvider {
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_base_url(POLONIEX_BASE_URL.to_string())
    }

    /// Create with a custom base URL (for testing or mirrors).
    pub fn with_base_url(base_url: String) -> Result<Self, ProviderError> {
        Self::with_options(base_url, DEFAULT_PERIOD_SECS, DEFAULT_TIMEOUT)
    }

    pub fn with_options(
        base_url: String,
        period_secs: u32,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        if period_secs == 0 {
            return Err(ProviderError::Config("period must be positive".into()));
        }
        if timeout.is_zero() {
            return Err(ProviderError::Config("timeout must be positive".into()));
        }

        let client = Client::builder()
            .user_agent(concat!("chart-history/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            period_secs,
        })
    }

    pub fn period_secs(&self) -> u32 {
        self.period_secs
    }
}

#[async_trait]
impl ChartSource for PoloniexProvider {
    fn name(&self) -> &str {
        "poloniex"
    }

    fn request_url(&self, key: &StorageKey) -> String {
        format!(
            "{}/public?command=returnChartData&currencyPair={}&start={}&end={}&period={}",
            self.base_url,
            key.pair(),
            key.start,
            key.end,
            self.period_secs
        )
    }

    async fn fetch_raw(&self, key: &StorageKey) -> Result<Vec<u8>, ProviderError> {
        let url = self.request_url(key);
        debug!("Fetching chart data from {url}");

        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(60);
            return Err(ProviderError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status,
                message: body,
            });
        }

        let body = response.bytes().await?;
        debug!("{key}: received {} byte(s)", body.len());
        Ok(body.to_vec())
    }
}

use std::path::PathBuf;

use async_trait::async_trait;
use chart_history_core::key::StorageKey;
use chart_history_core::store::ChartStore;
use tracing::info;

use crate::error::ProviderError;

/// A fully formed fetch: where to GET from and where the body is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartRequest {
    pub url: String,
    pub path: PathBuf,
}

/// Trait for fetching raw chart history from an external source.
#[async_trait]
pub trait ChartSource: Send + Sync {
    /// Source name (for logging/display).
    fn name(&self) -> &str;

    /// Request URL for a key. Pure formatting.
    fn request_url(&self, key: &StorageKey) -> String;

    /// Fetch the raw response body for a key. The body is not inspected.
    async fn fetch_raw(&self, key: &StorageKey) -> Result<Vec<u8>, ProviderError>;

    /// Request URL and storage path for a key.
    fn build_request(&self, store: &ChartStore, key: &StorageKey) -> ChartRequest {
        ChartRequest {
            url: self.request_url(key),
            path: store.file_path(key),
        }
    }

    /// Fetch a key and write the body verbatim to the store.
    /// Nothing is written when the fetch fails.
    async fn fetch_and_store(
        &self,
        store: &ChartStore,
        key: &StorageKey,
    ) -> Result<ChartRequest, ProviderError> {
        let request = self.build_request(store, key);
        let body = self.fetch_raw(key).await?;
        store.write_raw(key, &body)?;
        info!(
            "{}: stored {} byte(s) for {key} at {}",
            self.name(),
            body.len(),
            request.path.display()
        );
        Ok(request)
    }
}

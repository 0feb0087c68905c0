use crate::error::CrawlError;
use async_trait::async_trait;

/// Loads the rendered HTML of one listing page.
/// Implementations own their session (HTTP client or browser), so each worker
/// gets its own instance from a [`FetcherFactory`].
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, CrawlError>;

    /// Get the name of the fetch backend
    fn name(&self) -> &'static str;
}

/// Builds a fresh fetcher for every worker.
pub trait FetcherFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn PageFetcher>, CrawlError>;
}

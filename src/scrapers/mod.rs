pub mod browser;
pub mod http;
pub mod next_data;
pub mod traits;
pub mod types;

use std::sync::Arc;

pub use browser::{BrowserFetcher, BrowserFetcherFactory};
pub use http::{HttpFetcher, HttpFetcherFactory};
pub use next_data::extract_listing;
pub use traits::{FetcherFactory, PageFetcher};
pub use types::{FetchSettings, FetcherKind};

/// Factory for the configured fetch backend.
pub fn fetcher_factory(kind: FetcherKind, settings: FetchSettings) -> Arc<dyn FetcherFactory> {
    match kind {
        FetcherKind::Http => Arc::new(HttpFetcherFactory { settings }),
        FetcherKind::Browser => Arc::new(BrowserFetcherFactory { settings }),
    }
}

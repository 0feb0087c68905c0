use crate::error::CrawlError;
use crate::scrapers::traits::{FetcherFactory, PageFetcher};
use crate::scrapers::types::FetchSettings;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use reqwest::Client;
use tracing::{debug, warn};

/// Fetches listing pages with a plain HTTP client
pub struct HttpFetcher {
    client: Client,
    settings: FetchSettings,
}

impl HttpFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, CrawlError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("es-CO,es;q=0.9,en;q=0.8"));

        let client = Client::builder()
            .timeout(settings.page_timeout)
            .user_agent(settings.user_agent.as_str())
            .default_headers(headers)
            .build()?;

        Ok(Self { client, settings })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, CrawlError> {
        debug!("Fetching URL: {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                CrawlError::Timeout(self.settings.page_timeout)
            } else {
                CrawlError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = %status, "Listing page returned an error status");
            return Err(CrawlError::Status(status.as_u16()));
        }

        let html = response.text().await?;
        debug!("Downloaded {} bytes of HTML", html.len());
        Ok(html)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

pub struct HttpFetcherFactory {
    pub settings: FetchSettings,
}

impl FetcherFactory for HttpFetcherFactory {
    fn create(&self) -> Result<Box<dyn PageFetcher>, CrawlError> {
        Ok(Box::new(HttpFetcher::new(self.settings.clone())?))
    }
}

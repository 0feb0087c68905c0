use std::path::PathBuf;
use std::time::Duration;

/// Failure while fetching or extracting a single listing page.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("page load timed out after {0:?}")]
    Timeout(Duration),
    #[error("browser error: {0}")]
    Browser(String),
    #[error("__NEXT_DATA__ script not found in page")]
    MissingNextData,
    #[error("invalid __NEXT_DATA__ payload: {0}")]
    InvalidNextData(#[from] serde_json::Error),
    #[error("page carries no listing data")]
    NoListingData,
    #[error("crawl cancelled")]
    Cancelled,
}

impl CrawlError {
    /// Whether another attempt at the same URL can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            CrawlError::Http(e) => match e.status() {
                Some(status) => is_transient_status(status.as_u16()),
                None => true,
            },
            CrawlError::Status(code) => is_transient_status(*code),
            CrawlError::Timeout(_) | CrawlError::Browser(_) => true,
            // Client-side rendering sometimes lags behind navigation.
            CrawlError::MissingNextData => true,
            CrawlError::InvalidNextData(_) | CrawlError::NoListingData | CrawlError::Cancelled => {
                false
            }
        }
    }
}

fn is_transient_status(code: u16) -> bool {
    code == 408 || code == 429 || code >= 500
}

/// Failure while reading a URL source or a previously written result file.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("invalid spreadsheet {path}: {message}")]
    Spreadsheet { path: PathBuf, message: String },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} has no rows")]
    Empty { path: PathBuf },
    #[error("unsupported input format: {path}")]
    UnsupportedFormat { path: PathBuf },
}

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Which backend loads listing pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FetcherKind {
    /// Plain HTTP GET; enough when the page embeds its data server-side
    Http,
    /// Headless Chrome, one browser per worker
    Browser,
}

/// Settings shared by every fetcher instance
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub user_agent: String,
    /// Upper bound for loading one page
    pub page_timeout: Duration,
    /// Run Chrome without a window (browser backend only)
    pub headless: bool,
    /// CSS selector the browser waits for before reading the page
    pub ready_selector: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            page_timeout: Duration::from_secs(20),
            headless: true,
            ready_selector: "#__NEXT_DATA__".to_string(),
        }
    }
}

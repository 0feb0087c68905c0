use crate::pipeline::retry::{Backoff, RetryPolicy};
use crate::scrapers::types::{FetchSettings, FetcherKind, DEFAULT_USER_AGENT};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Runtime configuration, read from a TOML file.
///
/// Every field has a default so a partial file (or no file at all) works.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Save the checkpoint after this many finished URLs
    pub checkpoint_interval: usize,
    /// Attempts per URL, including the first one
    pub max_retries: u32,
    /// Base delay between attempts
    pub retry_delay_secs: u64,
    pub backoff: Backoff,
    /// URLs handed to one worker at a time
    pub batch_size: usize,
    /// Concurrent workers, each with its own fetch session
    pub max_workers: usize,
    /// Pause after every URL, per worker
    pub request_delay_ms: u64,
    pub page_timeout_secs: u64,
    pub headless: bool,
    pub fetcher: FetcherKind,
    pub user_agent: String,
    /// Root for checkpoints, batch directories and deliverables
    pub output_dir: PathBuf,
    pub log_level: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: 10,
            max_retries: 3,
            retry_delay_secs: 2,
            backoff: Backoff::Linear,
            batch_size: 100,
            max_workers: 3,
            request_delay_ms: 500,
            page_timeout_secs: 20,
            headless: true,
            fetcher: FetcherKind::Http,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            output_dir: PathBuf::from("resultados"),
            log_level: "info".to_string(),
        }
    }
}

impl CrawlerConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: CrawlerConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Falls back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        info!("Wrote configuration to {}", path.display());
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.max(1),
            base_delay: Duration::from_secs(self.retry_delay_secs),
            backoff: self.backoff,
        }
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            user_agent: self.user_agent.clone(),
            page_timeout: Duration::from_secs(self.page_timeout_secs),
            headless: self.headless,
            ..FetchSettings::default()
        }
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// Directory holding the `lote_XX.json` files and per-batch outputs.
    pub fn batches_dir(&self) -> PathBuf {
        self.output_dir.join("lotes")
    }
}

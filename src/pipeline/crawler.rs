use crate::config::CrawlerConfig;
use crate::error::CrawlError;
use crate::models::{CrawlStats, Listing};
use crate::pipeline::batches::chunk;
use crate::pipeline::checkpoint::CheckpointStore;
use crate::pipeline::retry::{retry_cancellable, sleep_unless_cancelled, RetryPolicy};
use crate::scrapers::next_data::extract_listing;
use crate::scrapers::traits::{FetcherFactory, PageFetcher};
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Crawls a URL list into a [`CheckpointStore`] with a bounded pool of
/// workers, each owning one fetcher.
pub struct BatchCrawler {
    config: CrawlerConfig,
    factory: Arc<dyn FetcherFactory>,
    store: Arc<Mutex<CheckpointStore>>,
    cancel: Arc<AtomicBool>,
}

#[derive(Clone)]
struct Worker {
    factory: Arc<dyn FetcherFactory>,
    store: Arc<Mutex<CheckpointStore>>,
    cancel: Arc<AtomicBool>,
    policy: RetryPolicy,
    request_delay: Duration,
}

impl BatchCrawler {
    pub fn new(config: CrawlerConfig, factory: Arc<dyn FetcherFactory>, store: CheckpointStore) -> Self {
        Self {
            config,
            factory,
            store: Arc::new(Mutex::new(store)),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an externally owned stop flag (set from the Ctrl-C handler).
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> Arc<Mutex<CheckpointStore>> {
        Arc::clone(&self.store)
    }

    /// Process every URL not yet in the checkpoint, then save, consolidate
    /// and return the counters.
    pub async fn crawl(&self, urls: &[String]) -> Result<CrawlStats> {
        let started = Instant::now();

        let pending: Vec<String> = {
            let mut store = self.store.lock().await;
            store.begin(urls.len());
            let pending: Vec<String> = urls.iter().filter(|u| !store.is_processed(u)).cloned().collect();
            store.record_skipped(urls.len() - pending.len());
            pending
        };

        info!(
            "Crawling {} URLs ({} already processed) with {} workers",
            pending.len(),
            urls.len() - pending.len(),
            self.config.max_workers.max(1)
        );

        let worker = Worker {
            factory: Arc::clone(&self.factory),
            store: Arc::clone(&self.store),
            cancel: Arc::clone(&self.cancel),
            policy: self.config.retry_policy(),
            request_delay: self.config.request_delay(),
        };

        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut tasks = JoinSet::new();
        for (index, urls) in chunk(&pending, self.config.batch_size).into_iter().enumerate() {
            let permit = Arc::clone(&semaphore).acquire_owned().await?;
            if self.cancel.load(Ordering::SeqCst) {
                break;
            }
            let worker = worker.clone();
            tasks.spawn(async move {
                let _permit = permit;
                worker.run_chunk(index + 1, urls).await
            });
        }

        let mut handled = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(count)) => handled += count,
                Ok(Err(e)) => error!("Worker stopped: {:#}", e),
                Err(e) => error!("Worker task failed: {}", e),
            }
        }

        if self.cancel.load(Ordering::SeqCst) {
            warn!("Crawl cancelled, saving checkpoint");
        }

        let mut store = self.store.lock().await;
        store.finish(started.elapsed(), handled);
        store.save()?;
        store.consolidate()?;
        let stats = store.stats().clone();

        info!(
            "Crawl finished: {} total, {} ok, {} failed, {} skipped in {:.1}s",
            stats.total,
            stats.success,
            stats.failed,
            stats.skipped,
            stats.duration_secs.unwrap_or_default()
        );
        Ok(stats)
    }
}

impl Worker {
    async fn run_chunk(&self, index: usize, urls: Vec<String>) -> Result<usize> {
        let fetcher = self.factory.create()?;
        info!(chunk = index, urls = urls.len(), "Worker started with {} fetcher", fetcher.name());

        let mut handled = 0;
        for url in &urls {
            if self.cancel.load(Ordering::SeqCst) {
                info!(chunk = index, "Stopping worker after {} URLs", handled);
                break;
            }

            let outcome =
                retry_cancellable(&self.policy, url, &self.cancel, |_| fetch_listing(fetcher.as_ref(), url)).await;

            {
                let mut store = self.store.lock().await;
                match outcome.value {
                    Ok(listing) => {
                        info!(url = %url, attempts = outcome.attempts, "Extracted listing {}", listing.code.as_deref().unwrap_or("-"));
                        store.record_success(&listing)?;
                    }
                    // Left pending for the next run.
                    Err(CrawlError::Cancelled) => {
                        info!(chunk = index, url = %url, "Stopping worker during retry wait");
                        break;
                    }
                    Err(e) => {
                        error!(url = %url, attempts = outcome.attempts, "Giving up: {}", e);
                        store.record_failure(url, &e, outcome.attempts)?;
                    }
                }
            }

            handled += 1;
            sleep_unless_cancelled(self.request_delay, &self.cancel).await;
        }
        Ok(handled)
    }
}

async fn fetch_listing(fetcher: &dyn PageFetcher, url: &str) -> Result<Listing, CrawlError> {
    let html = fetcher.fetch(url).await?;
    let listing = extract_listing(&html, url)?;
    if !listing.is_complete() {
        return Err(CrawlError::NoListingData);
    }
    Ok(listing)
}

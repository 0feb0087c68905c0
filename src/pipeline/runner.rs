use crate::config::CrawlerConfig;
use crate::models::CrawlStats;
use crate::output::{export_table, final_table, ExportPaths};
use crate::pipeline::batches::{batch_name, batch_output_dir, list_batch_numbers, read_batch_file};
use crate::pipeline::checkpoint::{dedupe_last_wins, read_listings, CheckpointStore, PROPERTIES_FILE};
use crate::pipeline::crawler::BatchCrawler;
use crate::scrapers::traits::FetcherFactory;
use anyhow::{bail, Context, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{error, info, warn};

/// What a crawl run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub stats: CrawlStats,
    pub exports: Option<ExportPaths>,
}

fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Crawl `urls` into `dir`, resuming from whatever the directory already
/// holds, and export the consolidated listings as `<stem>_<timestamp>.*`.
pub async fn crawl_into(
    config: &CrawlerConfig,
    factory: Arc<dyn FetcherFactory>,
    dir: &Path,
    urls: &[String],
    batch: Option<usize>,
    stem: &str,
    cancel: Arc<AtomicBool>,
) -> Result<RunReport> {
    let store = CheckpointStore::open(dir, config.checkpoint_interval, batch)?;
    let crawler = BatchCrawler::new(config.clone(), factory, store).with_cancel_flag(cancel);
    let stats = crawler.crawl(urls).await?;

    let listings = dedupe_last_wins(read_listings(&dir.join(PROPERTIES_FILE))?);
    let exports = if listings.is_empty() {
        warn!("No listings extracted in {}, skipping export", dir.display());
        None
    } else {
        let stem = format!("{}_{}", stem, timestamp());
        Some(export_table(&final_table(&listings), dir, &stem, "Inmuebles")?)
    };

    Ok(RunReport { stats, exports })
}

/// Crawl `lote_XX.json` into `lote_XX/`.
pub async fn run_batch(
    config: &CrawlerConfig,
    factory: Arc<dyn FetcherFactory>,
    number: usize,
    cancel: Arc<AtomicBool>,
) -> Result<RunReport> {
    let batches_dir = config.batches_dir();
    let batch = read_batch_file(&batches_dir, number)
        .with_context(|| format!("Failed to load batch {}", number))?;
    let dir = batch_output_dir(&batches_dir, number);

    info!(batch = number, urls = batch.urls.len(), "Processing {}", batch_name(number));
    let report = crawl_into(config, factory, &dir, &batch.urls, Some(number), &batch_name(number), cancel).await?;
    info!(
        batch = number,
        "{} done: {} ok, {} failed, {} skipped",
        batch_name(number),
        report.stats.success,
        report.stats.failed,
        report.stats.skipped
    );
    Ok(report)
}

/// Outcome of re-crawling the failed URLs of an output directory.
#[derive(Debug, Clone)]
pub struct RetryReport {
    pub attempted: usize,
    pub recovered: usize,
    pub still_failing: Vec<String>,
    pub failed_list: Option<PathBuf>,
}

/// Re-crawl every URL the checkpoint in `dir` lists as failed. URLs that
/// still fail are written to `fallidas_<timestamp>.txt`.
pub async fn retry_failed(
    config: &CrawlerConfig,
    factory: Arc<dyn FetcherFactory>,
    dir: &Path,
    batch: Option<usize>,
    cancel: Arc<AtomicBool>,
) -> Result<RetryReport> {
    let store = CheckpointStore::open(dir, config.checkpoint_interval, batch)?;
    let failed = store.failed_urls();
    if failed.is_empty() {
        info!("No failed URLs in {}", dir.display());
        return Ok(RetryReport {
            attempted: 0,
            recovered: 0,
            still_failing: Vec::new(),
            failed_list: None,
        });
    }

    info!("Retrying {} failed URLs from {}", failed.len(), dir.display());
    let crawler = BatchCrawler::new(config.clone(), factory, store).with_cancel_flag(cancel);
    crawler.crawl(&failed).await?;

    let still_failing: Vec<String> = {
        let store = crawler.store();
        let store = store.lock().await;
        failed.iter().filter(|u| !store.is_processed(u)).cloned().collect()
    };

    let failed_list = if still_failing.is_empty() {
        None
    } else {
        let path = dir.join(format!("fallidas_{}.txt", timestamp()));
        std::fs::write(&path, still_failing.join("\n") + "\n")
            .with_context(|| format!("Failed to write {}", path.display()))?;
        warn!("{} URLs still failing, listed in {}", still_failing.len(), path.display());
        Some(path)
    };

    Ok(RetryReport {
        attempted: failed.len(),
        recovered: failed.len() - still_failing.len(),
        still_failing,
        failed_list,
    })
}

/// Launch one `run-batch` process per batch file, one second apart, then
/// wait for all of them, reporting every `poll_interval`.
pub async fn run_all(
    config_path: &Path,
    config: &CrawlerConfig,
    numbers: Option<Vec<usize>>,
    poll_interval: Duration,
) -> Result<Vec<(usize, bool)>> {
    let batches_dir = config.batches_dir();
    let numbers = match numbers {
        Some(numbers) => numbers,
        None => list_batch_numbers(&batches_dir)?,
    };
    if numbers.is_empty() {
        bail!("No batch files found in {}; run `split` first", batches_dir.display());
    }

    let exe = std::env::current_exe().context("Failed to locate the crawler executable")?;
    let mut children: Vec<(usize, Child)> = Vec::with_capacity(numbers.len());

    for (i, &number) in numbers.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        let dir = batch_output_dir(&batches_dir, number);
        std::fs::create_dir_all(&dir)?;
        let log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("process.log"))
            .with_context(|| format!("Failed to open log for batch {}", number))?;

        let child = Command::new(&exe)
            .arg("--config")
            .arg(config_path)
            .arg("--output-dir")
            .arg(&config.output_dir)
            .arg("run-batch")
            .arg(number.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log))
            .spawn()
            .with_context(|| format!("Failed to start batch {}", number))?;

        info!(batch = number, pid = child.id().unwrap_or_default(), "Started {}", batch_name(number));
        children.push((number, child));
    }

    let mut finished: Vec<(usize, bool)> = Vec::new();
    loop {
        let mut running = Vec::new();
        for (number, mut child) in children {
            match child.try_wait() {
                Ok(Some(status)) => {
                    if status.success() {
                        info!(batch = number, "{} completed", batch_name(number));
                    } else {
                        error!(batch = number, "{} exited with {}", batch_name(number), status);
                    }
                    finished.push((number, status.success()));
                }
                Ok(None) => running.push((number, child)),
                Err(e) => {
                    error!(batch = number, "Lost track of {}: {}", batch_name(number), e);
                    finished.push((number, false));
                }
            }
        }
        children = running;

        info!("Active: {} | completed: {}", children.len(), finished.len());
        if children.is_empty() {
            break;
        }
        tokio::time::sleep(poll_interval).await;
    }

    finished.sort_unstable();
    let failures = finished.iter().filter(|(_, ok)| !ok).count();
    if failures > 0 {
        warn!("{} of {} batches exited with errors", failures, finished.len());
    } else {
        info!("All {} batches completed", finished.len());
    }
    Ok(finished)
}

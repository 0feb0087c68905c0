use crate::error::CrawlError;
use crate::models::{CrawlStats, Listing};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const CHECKPOINT_FILE: &str = "checkpoint.json";
pub const PROPERTIES_FILE: &str = "properties.jsonl";
pub const ERRORS_FILE: &str = "errors.jsonl";
pub const PROGRESS_FILE: &str = "progress.json";
pub const CONSOLIDATED_FILE: &str = "properties_consolidated.json";

/// Snapshot written to `checkpoint.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Checkpoint {
    pub session_id: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub processed_urls: Vec<String>,
    /// Attempts spent on URLs that have not succeeded yet
    pub failed_urls: BTreeMap<String, u32>,
    pub stats: CrawlStats,
}

/// One line of `errors.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub url: String,
    pub error: String,
    pub attempts: u32,
    pub at: DateTime<Utc>,
}

/// Human-facing summary in `progress.json`, read by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub lote: Option<usize>,
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    pub percent: f64,
    pub updated_at: DateTime<Utc>,
}

/// Durable crawl state for one output directory.
///
/// Successful listings are appended to `properties.jsonl` and flushed as soon
/// as they arrive; the JSON checkpoint is rewritten every `interval` outcomes.
/// On reopen, URLs already present in either file are treated as processed.
pub struct CheckpointStore {
    dir: PathBuf,
    interval: usize,
    batch: Option<usize>,
    session_id: String,
    processed: HashSet<String>,
    processed_order: Vec<String>,
    failed: BTreeMap<String, u32>,
    stats: CrawlStats,
    since_save: usize,
    properties: File,
    errors: File,
}

impl CheckpointStore {
    pub fn open(dir: &Path, interval: usize, batch: Option<usize>) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

        let checkpoint = match read_checkpoint(dir) {
            Ok(Some(checkpoint)) => checkpoint,
            Ok(None) => Checkpoint::default(),
            Err(e) => {
                warn!("Ignoring unreadable checkpoint in {}: {:#}", dir.display(), e);
                Checkpoint::default()
            }
        };

        let mut processed = HashSet::new();
        let mut processed_order = Vec::new();
        for url in checkpoint.processed_urls {
            if processed.insert(url.clone()) {
                processed_order.push(url);
            }
        }

        // A crash mid-append leaves a line without its newline; the next
        // append would glue onto it.
        for name in [PROPERTIES_FILE, ERRORS_FILE] {
            drop_torn_tail(&dir.join(name))?;
        }

        // A crash between the append and the next checkpoint save leaves
        // listings that only the JSONL file knows about.
        let mut recovered = 0;
        for listing in read_listings(&dir.join(PROPERTIES_FILE))? {
            if processed.insert(listing.url.clone()) {
                processed_order.push(listing.url);
                recovered += 1;
            }
        }
        if recovered > 0 {
            info!("Recovered {} processed URLs from {}", recovered, PROPERTIES_FILE);
        }

        let mut failed = checkpoint.failed_urls;
        failed.retain(|url, _| !processed.contains(url));

        if !processed.is_empty() || !failed.is_empty() {
            info!(
                "Resuming from checkpoint: {} processed, {} failed",
                processed.len(),
                failed.len()
            );
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            interval: interval.max(1),
            batch,
            session_id: Utc::now().format("%Y%m%d_%H%M%S").to_string(),
            processed,
            processed_order,
            failed,
            stats: checkpoint.stats,
            since_save: 0,
            properties: open_append(&dir.join(PROPERTIES_FILE))?,
            errors: open_append(&dir.join(ERRORS_FILE))?,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_processed(&self, url: &str) -> bool {
        self.processed.contains(url)
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    /// URLs that failed and have not succeeded since, in URL order.
    pub fn failed_urls(&self) -> Vec<String> {
        self.failed.keys().cloned().collect()
    }

    pub fn stats(&self) -> &CrawlStats {
        &self.stats
    }

    /// Register the size of the run. The total never shrinks, so a rerun over
    /// a subset (failed URLs) keeps the batch total.
    pub fn begin(&mut self, total: usize) {
        self.stats.total = self.stats.total.max(total);
        if self.stats.started_at.is_none() {
            self.stats.started_at = Some(Utc::now());
        }
    }

    pub fn record_success(&mut self, listing: &Listing) -> Result<()> {
        let line = serde_json::to_string(listing)?;
        writeln!(self.properties, "{}", line)
            .and_then(|_| self.properties.flush())
            .with_context(|| format!("Failed to append to {}", PROPERTIES_FILE))?;

        if self.processed.insert(listing.url.clone()) {
            self.processed_order.push(listing.url.clone());
        }
        self.failed.remove(&listing.url);
        self.stats.success += 1;
        self.tick()
    }

    pub fn record_failure(&mut self, url: &str, error: &CrawlError, attempts: u32) -> Result<()> {
        let record = ErrorRecord {
            url: url.to_string(),
            error: error.to_string(),
            attempts,
            at: Utc::now(),
        };
        writeln!(self.errors, "{}", serde_json::to_string(&record)?)
            .and_then(|_| self.errors.flush())
            .with_context(|| format!("Failed to append to {}", ERRORS_FILE))?;

        *self.failed.entry(url.to_string()).or_insert(0) += attempts;
        self.stats.failed += 1;
        self.tick()
    }

    pub fn record_skipped(&mut self, count: usize) {
        self.stats.skipped += count;
    }

    /// Store elapsed time and throughput for this session.
    pub fn finish(&mut self, elapsed: Duration, handled: usize) {
        let secs = elapsed.as_secs_f64();
        self.stats.duration_secs = Some(secs);
        self.stats.rate_per_sec = (secs > 0.0).then(|| handled as f64 / secs);
    }

    fn tick(&mut self) -> Result<()> {
        self.since_save += 1;
        if self.since_save >= self.interval {
            self.save()?;
        }
        Ok(())
    }

    pub fn progress(&self) -> Progress {
        let total = self.stats.total;
        let done = self.processed.len() + self.failed.len();
        let percent = if total == 0 {
            0.0
        } else {
            (done as f64 / total as f64 * 100.0).min(100.0)
        };
        Progress {
            lote: self.batch,
            total,
            processed: self.processed.len(),
            failed: self.failed.len(),
            percent,
            updated_at: Utc::now(),
        }
    }

    /// Rewrite `checkpoint.json` and `progress.json` atomically.
    pub fn save(&mut self) -> Result<()> {
        let checkpoint = Checkpoint {
            session_id: self.session_id.clone(),
            updated_at: Some(Utc::now()),
            processed_urls: self.processed_order.clone(),
            failed_urls: self.failed.clone(),
            stats: self.stats.clone(),
        };
        write_json_pretty(&self.dir.join(CHECKPOINT_FILE), &checkpoint)?;
        write_json_pretty(&self.dir.join(PROGRESS_FILE), &self.progress())?;
        self.since_save = 0;

        debug!(
            processed = self.processed.len(),
            failed = self.failed.len(),
            "Checkpoint saved in {}",
            self.dir.display()
        );
        Ok(())
    }

    /// Collapse `properties.jsonl` into `properties_consolidated.json`, one
    /// listing per URL.
    pub fn consolidate(&self) -> Result<Vec<Listing>> {
        let listings = dedupe_last_wins(read_listings(&self.dir.join(PROPERTIES_FILE))?);
        let path = self.dir.join(CONSOLIDATED_FILE);
        write_json_pretty(&path, &listings)?;
        info!("Consolidated {} listings into {}", listings.len(), path.display());
        Ok(listings)
    }
}

/// Keep one listing per URL: the last one read, at the position its URL was
/// first seen.
pub fn dedupe_last_wins(listings: Vec<Listing>) -> Vec<Listing> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<Listing> = Vec::new();
    for listing in listings {
        match index.get(&listing.url) {
            Some(&i) => unique[i] = listing,
            None => {
                index.insert(listing.url.clone(), unique.len());
                unique.push(listing);
            }
        }
    }
    unique
}

/// Read a JSONL listing file; corrupt lines are skipped with a warning.
pub fn read_listings(path: &Path) -> Result<Vec<Listing>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    let mut listings = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Listing>(&line) {
            Ok(listing) if !listing.url.is_empty() => listings.push(listing),
            Ok(_) => warn!("Line {} of {} has no URL", number + 1, path.display()),
            Err(e) => warn!("Skipping corrupt line {} of {}: {}", number + 1, path.display(), e),
        }
    }
    Ok(listings)
}

pub fn read_checkpoint(dir: &Path) -> Result<Option<Checkpoint>> {
    read_json(&dir.join(CHECKPOINT_FILE))
}

pub fn read_progress(dir: &Path) -> Result<Option<Progress>> {
    read_json(&dir.join(PROGRESS_FILE))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let value = serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))?;
    Ok(Some(value))
}

/// Cut an append-only log back to its last complete line.
fn drop_torn_tail(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if bytes.last().map_or(true, |b| *b == b'\n') {
        return Ok(());
    }
    let keep = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
    warn!(
        "Dropping {} bytes of unterminated line at the end of {}",
        bytes.len() - keep,
        path.display()
    );
    OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|f| f.set_len(keep as u64))
        .with_context(|| format!("Failed to truncate {}", path.display()))
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))
}

/// Pretty JSON, replaced atomically.
pub fn write_json_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    write_atomic(path, &serde_json::to_vec_pretty(value)?)
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(url: &str, code: &str) -> Listing {
        let mut listing = Listing::new(url);
        listing.code = Some(code.to_string());
        listing
    }

    #[test]
    fn test_reopen_restores_processed_and_failed() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = CheckpointStore::open(dir.path(), 100, Some(1)).unwrap();
            store.begin(3);
            store.record_success(&listing("https://x.co/1", "1")).unwrap();
            store
                .record_failure("https://x.co/2", &CrawlError::Status(500), 3)
                .unwrap();
            store.save().unwrap();
        }

        let store = CheckpointStore::open(dir.path(), 100, Some(1)).unwrap();
        assert!(store.is_processed("https://x.co/1"));
        assert!(!store.is_processed("https://x.co/2"));
        assert_eq!(store.failed_urls(), vec!["https://x.co/2".to_string()]);
        assert_eq!(store.stats().total, 3);
        assert_eq!(store.stats().success, 1);
    }

    #[test]
    fn test_jsonl_counts_as_processed_without_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        {
            // Interval never reached: no checkpoint.json written.
            let mut store = CheckpointStore::open(dir.path(), 50, None).unwrap();
            store.record_success(&listing("https://x.co/a", "10")).unwrap();
        }
        assert!(!dir.path().join(CHECKPOINT_FILE).exists());

        let store = CheckpointStore::open(dir.path(), 50, None).unwrap();
        assert!(store.is_processed("https://x.co/a"));
    }

    #[test]
    fn test_later_success_clears_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CheckpointStore::open(dir.path(), 1, None).unwrap();
        store.begin(1);
        store
            .record_failure("https://x.co/b", &CrawlError::Timeout(Duration::from_secs(1)), 3)
            .unwrap();
        store
            .record_failure("https://x.co/b", &CrawlError::Timeout(Duration::from_secs(1)), 2)
            .unwrap();
        let checkpoint = read_checkpoint(dir.path()).unwrap().unwrap();
        assert_eq!(checkpoint.failed_urls["https://x.co/b"], 5);

        store.record_success(&listing("https://x.co/b", "2")).unwrap();
        assert!(store.failed_urls().is_empty());
        assert_eq!(store.progress().percent, 100.0);
    }

    #[test]
    fn test_interval_controls_saves() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CheckpointStore::open(dir.path(), 2, Some(4)).unwrap();
        store.begin(4);
        store.record_success(&listing("https://x.co/1", "1")).unwrap();
        assert!(read_checkpoint(dir.path()).unwrap().is_none());
        store.record_success(&listing("https://x.co/2", "2")).unwrap();

        let checkpoint = read_checkpoint(dir.path()).unwrap().unwrap();
        assert_eq!(checkpoint.processed_urls.len(), 2);
        let progress = read_progress(dir.path()).unwrap().unwrap();
        assert_eq!(progress.lote, Some(4));
        assert_eq!(progress.percent, 50.0);
    }

    #[test]
    fn test_consolidation_keeps_last_record_per_url() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CheckpointStore::open(dir.path(), 10, None).unwrap();
        store.record_success(&listing("https://x.co/1", "old")).unwrap();
        store.record_success(&listing("https://x.co/2", "2")).unwrap();
        store.record_success(&listing("https://x.co/1", "new")).unwrap();

        let listings = store.consolidate().unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].url, "https://x.co/1");
        assert_eq!(listings[0].code.as_deref(), Some("new"));
        assert!(dir.path().join(CONSOLIDATED_FILE).exists());
    }

    #[test]
    fn test_append_after_torn_line_stays_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PROPERTIES_FILE);
        std::fs::write(
            &path,
            "{\"url_inmueble\":\"https://x.co/0\",\"cod_fr\":\"0\"}\n{\"url_inmueble\":\"https://x.co/1\",\"cod",
        )
        .unwrap();

        {
            let mut store = CheckpointStore::open(dir.path(), 1, None).unwrap();
            assert!(store.is_processed("https://x.co/0"));
            assert!(!store.is_processed("https://x.co/1"));
            store.record_success(&listing("https://x.co/2", "2")).unwrap();
        }

        let store = CheckpointStore::open(dir.path(), 1, None).unwrap();
        assert!(store.is_processed("https://x.co/2"));
        let urls: Vec<String> = store.consolidate().unwrap().into_iter().map(|l| l.url).collect();
        assert_eq!(urls, vec!["https://x.co/0", "https://x.co/2"]);
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PROPERTIES_FILE);
        std::fs::write(
            &path,
            "{\"url_inmueble\":\"https://x.co/1\",\"cod_fr\":\"1\"}\n{\"url_inmueble\": \"https://x.co/2\"\n\n",
        )
        .unwrap();
        let listings = read_listings(&path).unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].code.as_deref(), Some("1"));
    }
}

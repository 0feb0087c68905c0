use crate::merge::{has_extension, merge_records, sort_by_mtime, MergePolicy, Sourced};
use crate::models::Listing;
use crate::pipeline::checkpoint::{dedupe_last_wins, read_listings, CONSOLIDATED_FILE, ERRORS_FILE, PROPERTIES_FILE};
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Keys under which result files store the listing URL, raw or final layout.
const URL_KEYS: [&str; 3] = ["url_inmueble", "URL INMUEBLE", "url"];

/// Crawl outputs holding raw listings.
pub fn is_listing_file(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if name == ERRORS_FILE {
        return false;
    }
    name == PROPERTIES_FILE || name == CONSOLIDATED_FILE || has_extension(path, &["jsonl"])
}

fn read_values(path: &Path) -> Result<Vec<Value>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if has_extension(path, &["jsonl"]) {
        return Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect());
    }
    match serde_json::from_str::<Value>(&content).with_context(|| format!("Invalid JSON in {}", path.display()))? {
        Value::Array(items) => Ok(items),
        _ => Ok(Vec::new()),
    }
}

/// Listings from a JSONL log or a JSON array; entries that do not parse are
/// skipped.
pub fn load_listings(path: &Path) -> Result<Vec<Listing>> {
    if has_extension(path, &["jsonl"]) {
        return read_listings(path);
    }
    let mut listings = Vec::new();
    for value in read_values(path)? {
        match serde_json::from_value::<Listing>(value) {
            Ok(listing) if !listing.url.is_empty() => listings.push(listing),
            Ok(_) => {}
            Err(e) => warn!("Skipping entry in {}: {}", path.display(), e),
        }
    }
    Ok(listings)
}

/// One listing per URL across result files, oldest file first. A listing is
/// valid once its site code is known. Inside one file the last line for a URL
/// wins, as in per-batch consolidation.
pub fn merge_listings(paths: &[PathBuf], policy: MergePolicy) -> Result<Vec<Sourced<Listing>>> {
    let mut sources = Vec::new();
    for path in sort_by_mtime(paths.to_vec())? {
        match load_listings(&path) {
            Ok(listings) => {
                info!("Read {} listings from {}", listings.len(), path.display());
                sources.push((path, dedupe_last_wins(listings)));
            }
            Err(e) => warn!("Skipping {}: {:#}", path.display(), e),
        }
    }
    let merged = merge_records(sources, policy, |l| l.url.trim().to_string(), Listing::is_complete);
    info!("Unique listings by URL: {}", merged.len());
    Ok(merged)
}

/// Number of distinct listing URLs across result files in either layout.
pub fn count_unique(paths: &[PathBuf]) -> Result<usize> {
    let mut urls = HashSet::new();
    for path in paths {
        let values = match read_values(path) {
            Ok(values) => values,
            Err(e) => {
                warn!("Skipping {}: {:#}", path.display(), e);
                continue;
            }
        };
        for value in &values {
            if let Some(url) = URL_KEYS
                .iter()
                .find_map(|k| value.get(*k).and_then(Value::as_str))
                .map(str::trim)
                .filter(|u| !u.is_empty())
            {
                urls.insert(url.to_string());
            }
        }
    }
    info!("Unique listings read: {}", urls.len());
    Ok(urls.len())
}

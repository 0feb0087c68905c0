//! Combining result files from several runs into one record per URL.

pub mod contacts;
pub mod listings;
pub mod phone;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

pub use contacts::{attach_contacts, merge_contacts, order_by_input, ContactSummary};
pub use listings::{count_unique, merge_listings};
pub use phone::{normalize_phone, valid_phone, PHONE_NOT_FOUND};

/// Which record survives when two sources hold the same URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    /// Keep the first record; replace it only when it is invalid and the
    /// newer one is valid
    FirstValidWins,
    /// Like `first-valid-wins`, but files named `*RECHECK*` or `*OVERRIDE*`
    /// always replace
    #[default]
    OverrideFiles,
    /// Every later source replaces the earlier record
    LastWins,
}

/// Re-run files whose records replace whatever came before.
pub fn is_override_source(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().to_uppercase())
        .is_some_and(|name| name.contains("RECHECK") || name.contains("OVERRIDE"))
}

/// A merged record and the file it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Sourced<T> {
    pub record: T,
    pub source: PathBuf,
}

/// Merge per-file record lists, given oldest first, into one record per key.
///
/// Output order is the order in which each key was first seen.
pub fn merge_records<T, K, V>(
    sources: Vec<(PathBuf, Vec<T>)>,
    policy: MergePolicy,
    key: K,
    is_valid: V,
) -> Vec<Sourced<T>>
where
    K: Fn(&T) -> String,
    V: Fn(&T) -> bool,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<Sourced<T>> = Vec::new();

    for (source, records) in sources {
        let overriding = policy == MergePolicy::OverrideFiles && is_override_source(&source);
        for record in records {
            let k = key(&record);
            if k.is_empty() {
                continue;
            }
            match index.get(&k) {
                None => {
                    index.insert(k, merged.len());
                    merged.push(Sourced {
                        record,
                        source: source.clone(),
                    });
                }
                Some(&i) => {
                    let replace = match policy {
                        MergePolicy::LastWins => true,
                        _ if overriding => true,
                        _ => !is_valid(&merged[i].record) && is_valid(&record),
                    };
                    if replace {
                        debug!("{} replaced by {}", k, source.display());
                        merged[i] = Sourced {
                            record,
                            source: source.clone(),
                        };
                    }
                }
            }
        }
    }
    merged
}

/// Sort by modification time, oldest first; ties by path.
pub fn sort_by_mtime(mut paths: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    let mut stamped = Vec::with_capacity(paths.len());
    for path in paths.drain(..) {
        let modified = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        stamped.push((modified, path));
    }
    stamped.sort_by(|a: &(SystemTime, PathBuf), b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    Ok(stamped.into_iter().map(|(_, p)| p).collect())
}

/// Expand directories into the files inside them (recursively) whose name
/// passes `accept`; plain file arguments are kept as given.
pub fn collect_sources(inputs: &[PathBuf], accept: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            walk(input, &accept, &mut files)?;
        } else {
            files.push(input.clone());
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn walk(dir: &Path, accept: &impl Fn(&Path) -> bool, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, accept, files)?;
        } else if accept(&path) {
            files.push(path);
        }
    }
    Ok(())
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.contains(&e.to_lowercase().as_str()))
}

use crate::error::InputError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Contents of one `lote_XX.json` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFile {
    pub lote: usize,
    pub total: usize,
    pub urls: Vec<String>,
}

/// `lote_07`
pub fn batch_name(number: usize) -> String {
    format!("lote_{:02}", number)
}

pub fn batch_file_path(dir: &Path, number: usize) -> PathBuf {
    dir.join(format!("{}.json", batch_name(number)))
}

/// Per-batch output directory, next to the batch file.
pub fn batch_output_dir(dir: &Path, number: usize) -> PathBuf {
    dir.join(batch_name(number))
}

/// Split `urls` into `count` batches of `n / count` URLs; the last batch
/// takes the remainder. With fewer URLs than batches every URL gets its own.
pub fn split_into_batches(urls: &[String], count: usize) -> Vec<Vec<String>> {
    if urls.is_empty() || count == 0 {
        return Vec::new();
    }
    if urls.len() < count {
        return urls.iter().map(|u| vec![u.clone()]).collect();
    }

    let size = urls.len() / count;
    let mut batches = Vec::with_capacity(count);
    for i in 0..count {
        let start = i * size;
        let end = if i == count - 1 { urls.len() } else { start + size };
        batches.push(urls[start..end].to_vec());
    }
    batches
}

/// In-process work units handed to one worker at a time.
pub fn chunk(urls: &[String], batch_size: usize) -> Vec<Vec<String>> {
    urls.chunks(batch_size.max(1)).map(<[String]>::to_vec).collect()
}

/// Write `lote_01.json`, `lote_02.json`, ... and return their paths.
///
/// Batch files left by an earlier split are removed first, so the directory
/// only lists the batches of this split.
pub fn write_batch_files(dir: &Path, batches: &[Vec<String>]) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create batch directory {}", dir.display()))?;

    for number in list_batch_numbers(dir)? {
        let stale = batch_file_path(dir, number);
        std::fs::remove_file(&stale).with_context(|| format!("Failed to remove {}", stale.display()))?;
        if batch_output_dir(dir, number).is_dir() {
            warn!(
                "{} keeps crawl state from an earlier split",
                batch_output_dir(dir, number).display()
            );
        }
    }

    let mut paths = Vec::with_capacity(batches.len());
    for (i, urls) in batches.iter().enumerate() {
        let number = i + 1;
        let file = BatchFile {
            lote: number,
            total: urls.len(),
            urls: urls.clone(),
        };
        let path = batch_file_path(dir, number);
        std::fs::write(&path, serde_json::to_string_pretty(&file)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(batch = number, urls = urls.len(), "Wrote {}", path.display());
        paths.push(path);
    }
    Ok(paths)
}

pub fn read_batch_file(dir: &Path, number: usize) -> Result<BatchFile, InputError> {
    let path = batch_file_path(dir, number);
    let content = std::fs::read_to_string(&path).map_err(|source| InputError::Io {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| InputError::Json { path, source })
}

/// Batch numbers that have a `lote_XX.json` file in `dir`, ascending.
pub fn list_batch_numbers(dir: &Path) -> Result<Vec<usize>> {
    let mut numbers = Vec::new();
    if !dir.exists() {
        return Ok(numbers);
    }
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let name = entry?.file_name().to_string_lossy().to_string();
        if let Some(number) = name
            .strip_prefix("lote_")
            .and_then(|rest| rest.strip_suffix(".json"))
            .and_then(|n| n.parse::<usize>().ok())
        {
            numbers.push(number);
        }
    }
    numbers.sort_unstable();
    Ok(numbers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://x.co/{i}")).collect()
    }

    #[test]
    fn test_last_batch_takes_remainder() {
        let batches = split_into_batches(&urls(10), 3);
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 4]);
        assert_eq!(batches.concat(), urls(10));
    }

    #[test]
    fn test_fewer_urls_than_batches() {
        let batches = split_into_batches(&urls(2), 5);
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.len() == 1));
        assert!(split_into_batches(&[], 4).is_empty());
    }

    #[test]
    fn test_chunking() {
        let chunks = chunk(&urls(5), 2);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], vec!["https://x.co/4".to_string()]);
        assert_eq!(chunk(&urls(3), 0).len(), 3);
    }

    #[test]
    fn test_write_and_read_batches() {
        let dir = tempfile::tempdir().unwrap();
        let batches = split_into_batches(&urls(7), 2);
        let paths = write_batch_files(dir.path(), &batches).unwrap();
        assert!(paths[0].ends_with("lote_01.json"));
        assert!(paths[1].ends_with("lote_02.json"));

        let second = read_batch_file(dir.path(), 2).unwrap();
        assert_eq!(second.lote, 2);
        assert_eq!(second.total, 4);
        assert_eq!(list_batch_numbers(dir.path()).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_resplit_removes_stale_batch_files() {
        let dir = tempfile::tempdir().unwrap();
        write_batch_files(dir.path(), &split_into_batches(&urls(10), 5)).unwrap();
        write_batch_files(dir.path(), &split_into_batches(&urls(10), 3)).unwrap();

        assert_eq!(list_batch_numbers(dir.path()).unwrap(), vec![1, 2, 3]);
        let all: Vec<String> = (1..=3)
            .flat_map(|n| read_batch_file(dir.path(), n).unwrap().urls)
            .collect();
        assert_eq!(all, urls(10));
    }
}

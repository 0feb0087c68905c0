use crate::pipeline::batches::{batch_name, batch_output_dir, list_batch_numbers, read_batch_file};
use crate::pipeline::checkpoint::{read_progress, PROPERTIES_FILE};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum BatchState {
    NotStarted,
    /// Only the listing log exists, no progress file yet
    Partial { lines: usize },
    Running {
        processed: usize,
        failed: usize,
        percent: f64,
        updated_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchStatus {
    pub number: usize,
    pub total: usize,
    pub state: BatchState,
}

impl BatchStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self.state, BatchState::Running { percent, .. } if percent >= 100.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusSummary {
    pub completed: usize,
    pub active: usize,
    pub not_started: usize,
    pub processed: usize,
    pub failed: usize,
}

impl StatusSummary {
    /// Share of finished URLs that succeeded.
    pub fn success_rate(&self) -> f64 {
        let done = self.processed + self.failed;
        if done == 0 {
            0.0
        } else {
            self.processed as f64 / done as f64 * 100.0
        }
    }
}

fn count_lines(path: &Path) -> usize {
    match std::fs::File::open(path) {
        Ok(file) => BufReader::new(file)
            .lines()
            .map_while(|l| l.ok())
            .filter(|l| !l.trim().is_empty())
            .count(),
        Err(_) => 0,
    }
}

/// State of every `lote_XX` batch under `dir`.
pub fn batch_status(dir: &Path) -> Result<Vec<BatchStatus>> {
    let mut statuses = Vec::new();
    for number in list_batch_numbers(dir)? {
        let total = read_batch_file(dir, number).map(|b| b.urls.len()).unwrap_or(0);
        let output = batch_output_dir(dir, number);

        let progress = match read_progress(&output) {
            Ok(progress) => progress,
            Err(e) => {
                warn!("Unreadable progress for {}: {:#}", batch_name(number), e);
                None
            }
        };

        let state = match progress {
            Some(p) => BatchState::Running {
                processed: p.processed,
                failed: p.failed,
                percent: p.percent,
                updated_at: p.updated_at,
            },
            None if output.join(PROPERTIES_FILE).exists() => BatchState::Partial {
                lines: count_lines(&output.join(PROPERTIES_FILE)),
            },
            None => BatchState::NotStarted,
        };
        statuses.push(BatchStatus { number, total, state });
    }
    Ok(statuses)
}

pub fn summarize(statuses: &[BatchStatus]) -> StatusSummary {
    let mut summary = StatusSummary::default();
    for status in statuses {
        match &status.state {
            BatchState::NotStarted => summary.not_started += 1,
            BatchState::Partial { lines } => {
                summary.active += 1;
                summary.processed += lines;
            }
            BatchState::Running { processed, failed, .. } => {
                if status.is_complete() {
                    summary.completed += 1;
                } else {
                    summary.active += 1;
                }
                summary.processed += processed;
                summary.failed += failed;
            }
        }
    }
    summary
}

/// Plain-text status table for the terminal.
pub fn render(statuses: &[BatchStatus]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<9} {:>8} {:>10} {:>8} {:>7}  {}",
        "LOTE", "TOTAL", "PROCESSED", "FAILED", "%", "UPDATED"
    );
    for status in statuses {
        let name = batch_name(status.number);
        let _ = match &status.state {
            BatchState::NotStarted => writeln!(out, "{:<9} {:>8}  not started", name, status.total),
            BatchState::Partial { lines } => writeln!(
                out,
                "{:<9} {:>8} {:>10} {:>8} {:>7}  (no progress file)",
                name, status.total, lines, "-", "-"
            ),
            BatchState::Running {
                processed,
                failed,
                percent,
                updated_at,
            } => writeln!(
                out,
                "{:<9} {:>8} {:>10} {:>8} {:>6.1}%  {}",
                name,
                status.total,
                processed,
                failed,
                percent,
                updated_at.format("%Y-%m-%d %H:%M:%S")
            ),
        };
    }

    let summary = summarize(statuses);
    let _ = writeln!(
        out,
        "\nCompleted: {} | Active: {} | Not started: {} | Success rate: {:.1}%",
        summary.completed,
        summary.active,
        summary.not_started,
        summary.success_rate()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Listing;
    use crate::pipeline::batches::write_batch_files;
    use crate::pipeline::checkpoint::CheckpointStore;

    #[test]
    fn test_status_of_each_batch() {
        let dir = tempfile::tempdir().unwrap();
        let batches: Vec<Vec<String>> = (0..3)
            .map(|b| (0..2).map(|i| format!("https://x.co/{b}/{i}")).collect())
            .collect();
        write_batch_files(dir.path(), &batches).unwrap();

        // lote_01 finished
        let mut store = CheckpointStore::open(&batch_output_dir(dir.path(), 1), 10, Some(1)).unwrap();
        store.begin(2);
        for url in &batches[0] {
            let mut listing = Listing::new(url.as_str());
            listing.code = Some("1".into());
            store.record_success(&listing).unwrap();
        }
        store.save().unwrap();

        // lote_02 has a listing log but never saved a checkpoint
        let output = batch_output_dir(dir.path(), 2);
        std::fs::create_dir_all(&output).unwrap();
        std::fs::write(output.join(PROPERTIES_FILE), "{\"url_inmueble\":\"https://x.co/1/0\"}\n").unwrap();

        let statuses = batch_status(dir.path()).unwrap();
        assert_eq!(statuses.len(), 3);
        assert!(statuses[0].is_complete());
        assert_eq!(statuses[1].state, BatchState::Partial { lines: 1 });
        assert_eq!(statuses[2].state, BatchState::NotStarted);

        let summary = summarize(&statuses);
        assert_eq!((summary.completed, summary.active, summary.not_started), (1, 1, 1));
        assert_eq!(summary.processed, 3);

        let table = render(&statuses);
        assert!(table.contains("lote_03"));
        assert!(table.contains("not started"));
        assert!(table.contains("Completed: 1"));
    }
}

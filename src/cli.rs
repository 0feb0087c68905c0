use crate::config::CrawlerConfig;
use crate::merge::MergePolicy;
use crate::pipeline::batches::{batch_name, batch_output_dir};
use crate::scrapers::types::FetcherKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "listing-crawler")]
#[command(about = "Resumable batch crawler for real-estate listings", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML); defaults apply when it does not exist
    #[arg(short, long, global = true, default_value = "crawler.toml")]
    pub config: PathBuf,

    /// Override `output_dir`
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Override `max_workers`
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    /// Override the fetch backend
    #[arg(long, global = true, value_enum)]
    pub fetcher: Option<FetcherKind>,

    /// Override `log_level` (RUST_LOG still wins)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Split a URL source into lote_XX.json batch files
    Split {
        /// Spreadsheet, CSV, JSON or text file with the URLs
        input: PathBuf,
        #[arg(short = 'n', long, default_value_t = 5)]
        batches: usize,
    },
    /// Crawl a URL source in this process, resuming from its checkpoint
    Crawl {
        input: PathBuf,
        /// Output directory (default: <output_dir>/<input file stem>)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Only take the first N URLs
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Crawl one batch file into its lote_XX directory
    RunBatch { number: usize },
    /// Start one run-batch process per batch file and wait for all of them
    RunAll {
        /// Batch numbers to run (default: every batch file)
        #[arg(long, value_delimiter = ',')]
        batches: Vec<usize>,
        /// Seconds between progress reports
        #[arg(long, default_value_t = 60)]
        poll_secs: u64,
    },
    /// Re-crawl the URLs a previous run recorded as failed
    RetryFailed {
        #[arg(long, conflicts_with = "dir")]
        batch: Option<usize>,
        /// Output directory of a `crawl` run
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Show progress of every batch
    Status,
    /// Merge listing results from several runs into one deliverable
    Consolidate {
        /// Files or directories (default: the batches directory)
        inputs: Vec<PathBuf>,
        #[arg(long, value_enum, default_value_t = MergePolicy::OverrideFiles)]
        policy: MergePolicy,
        #[arg(long, default_value = "extraction_completo_fusionado")]
        name: String,
    },
    /// Convert a listings JSON/JSONL file to the final JSON, CSV and XLSX layout
    Export {
        input: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Merge contact result files into one record per URL
    MergeContacts {
        inputs: Vec<PathBuf>,
        /// Original URL sheet; sets the output order and adds the Con_Origen sheet
        #[arg(long)]
        input_sheet: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = MergePolicy::OverrideFiles)]
        policy: MergePolicy,
        #[arg(long, default_value = "extraction_emails_FINAL")]
        name: String,
    },
    /// Add email/telefono columns to a master sheet, joined by listing id
    AttachContacts {
        master: PathBuf,
        /// Contact files or directories
        contacts: Vec<PathBuf>,
        #[arg(long, default_value = "extraction_completo_with_contacts")]
        name: String,
    },
    /// Count unique listing URLs across result files
    Count {
        /// Files or directories (default: the batches directory)
        inputs: Vec<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a configuration file with every default spelled out
    Init {
        #[arg(long)]
        force: bool,
    },
}

impl Commands {
    /// Commands that fetch pages and stop gracefully on Ctrl-C.
    pub fn crawls(&self) -> bool {
        matches!(
            self,
            Commands::Crawl { .. } | Commands::RunBatch { .. } | Commands::RetryFailed { .. }
        )
    }
}

impl Cli {
    /// Fold command-line overrides into the loaded configuration.
    pub fn apply_overrides(&self, config: &mut CrawlerConfig) {
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(workers) = self.workers {
            config.max_workers = workers.max(1);
        }
        if let Some(fetcher) = self.fetcher {
            config.fetcher = fetcher;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }

    /// Where this command appends its log, if anywhere.
    pub fn log_file(&self, config: &CrawlerConfig) -> Option<PathBuf> {
        match &self.command {
            Commands::Config { .. } | Commands::Status => None,
            Commands::RunBatch { number } => {
                Some(batch_output_dir(&config.batches_dir(), *number).join("crawler.log"))
            }
            Commands::RetryFailed { batch: Some(number), .. } => {
                Some(batch_output_dir(&config.batches_dir(), *number).join("crawler.log"))
            }
            Commands::RetryFailed { dir: Some(dir), .. } => Some(dir.join("crawler.log")),
            _ => Some(config.output_dir.join("crawler.log")),
        }
    }

    /// Label for the run in log lines
    pub fn run_label(&self) -> String {
        match &self.command {
            Commands::RunBatch { number } => batch_name(*number),
            _ => "main".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_overrides() {
        let cli = Cli::parse_from([
            "listing-crawler",
            "run-batch",
            "3",
            "--workers",
            "6",
            "--fetcher",
            "browser",
            "--output-dir",
            "/tmp/salida",
        ]);
        let mut config = CrawlerConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.max_workers, 6);
        assert_eq!(config.fetcher, FetcherKind::Browser);
        assert_eq!(
            cli.log_file(&config),
            Some(PathBuf::from("/tmp/salida/lotes/lote_03/crawler.log"))
        );
        assert_eq!(cli.run_label(), "lote_03");
    }

    #[test]
    fn test_run_all_batch_list() {
        let cli = Cli::parse_from(["listing-crawler", "run-all", "--batches", "1,3,5"]);
        match cli.command {
            Commands::RunAll { batches, poll_secs } => {
                assert_eq!(batches, vec![1, 3, 5]);
                assert_eq!(poll_secs, 60);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_merge_policy_flag() {
        let cli = Cli::parse_from(["listing-crawler", "merge-contacts", "a.json", "--policy", "last-wins"]);
        match cli.command {
            Commands::MergeContacts { policy, inputs, .. } => {
                assert_eq!(policy, MergePolicy::LastWins);
                assert_eq!(inputs, vec![PathBuf::from("a.json")]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_only_crawling_commands_trap_interrupts() {
        let crawls = |args: &[&str]| Cli::parse_from(args.iter().copied()).command.crawls();
        assert!(crawls(&["listing-crawler", "run-batch", "2"]));
        assert!(crawls(&["listing-crawler", "crawl", "urls.xlsx"]));
        assert!(crawls(&["listing-crawler", "retry-failed", "--batch", "1"]));
        assert!(!crawls(&["listing-crawler", "run-all"]));
        assert!(!crawls(&["listing-crawler", "status"]));
        assert!(!crawls(&["listing-crawler", "count"]));
    }
}

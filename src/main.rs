use anyhow::{bail, Context, Result};
use clap::Parser;
use listing_crawler::cli::{Cli, Commands, ConfigAction};
use listing_crawler::config::CrawlerConfig;
use listing_crawler::merge::{self, contacts, listings};
use listing_crawler::output::{export_table, final_table};
use listing_crawler::pipeline::batches::{batch_output_dir, split_into_batches, write_batch_files};
use listing_crawler::pipeline::checkpoint::write_json_pretty;
use listing_crawler::pipeline::input::{load_urls, InputTable};
use listing_crawler::pipeline::{runner, status};
use listing_crawler::scrapers::fetcher_factory;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = CrawlerConfig::load_or_default(&cli.config)?;
    cli.apply_overrides(&mut config);

    listing_crawler::logging::init(&config.log_level, cli.log_file(&config).as_deref())?;
    info!(run = %cli.run_label(), "listing-crawler {}", env!("CARGO_PKG_VERSION"));

    let cancel = Arc::new(AtomicBool::new(false));
    if cli.command.crawls() {
        install_interrupt_handler(Arc::clone(&cancel));
    }

    run(&cli, &config, cancel).await
}

/// First Ctrl-C stops the crawl gracefully, a second one exits at once.
fn install_interrupt_handler(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupt received, finishing in-flight URLs and saving checkpoint (Ctrl-C again to abort)");
        cancel.store(true, Ordering::SeqCst);

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Second interrupt, exiting without final checkpoint");
            std::process::exit(130);
        }
    });
}

async fn run(cli: &Cli, config: &CrawlerConfig, cancel: Arc<AtomicBool>) -> Result<()> {
    let factory = || fetcher_factory(config.fetcher, config.fetch_settings());

    match &cli.command {
        Commands::Config {
            action: ConfigAction::Init { force },
        } => {
            if cli.config.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", cli.config.display());
            }
            config.save_to_file(&cli.config)?;
        }

        Commands::Split { input, batches } => {
            let urls = load_urls(input)?;
            let parts = split_into_batches(&urls, *batches);
            let paths = write_batch_files(&config.batches_dir(), &parts)?;
            info!("Split {} URLs into {} batch files", urls.len(), paths.len());
        }

        Commands::Crawl { input, out, limit } => {
            let mut urls = load_urls(input)?;
            if let Some(limit) = limit {
                urls.truncate(*limit);
            }
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "crawl".to_string());
            let dir = out.clone().unwrap_or_else(|| config.output_dir.join(&stem));

            let report = runner::crawl_into(config, factory(), &dir, &urls, None, &stem, cancel).await?;
            if let Some(exports) = report.exports {
                info!("Deliverables: {}", exports.xlsx.display());
            }
        }

        Commands::RunBatch { number } => {
            runner::run_batch(config, factory(), *number, cancel).await?;
        }

        Commands::RunAll { batches, poll_secs } => {
            let numbers = (!batches.is_empty()).then(|| batches.clone());
            let results =
                runner::run_all(&cli.config, config, numbers, Duration::from_secs((*poll_secs).max(1))).await?;
            if results.iter().any(|(_, ok)| !ok) {
                bail!("Some batches failed; see lote_XX/process.log");
            }
        }

        Commands::RetryFailed { batch, dir } => {
            let dir = match (batch, dir) {
                (Some(number), _) => batch_output_dir(&config.batches_dir(), *number),
                (None, Some(dir)) => dir.clone(),
                (None, None) => bail!("Pass --batch <n> or --dir <path>"),
            };
            let report = runner::retry_failed(config, factory(), &dir, *batch, cancel).await?;
            info!(
                "Retried {} URLs: {} recovered, {} still failing",
                report.attempted,
                report.recovered,
                report.still_failing.len()
            );
        }

        Commands::Status => {
            let statuses = status::batch_status(&config.batches_dir())?;
            if statuses.is_empty() {
                println!("No batch files in {}", config.batches_dir().display());
            } else {
                print!("{}", status::render(&statuses));
            }
        }

        Commands::Consolidate { inputs, policy, name } => {
            let sources = merge::collect_sources(&or_default(inputs, config.batches_dir()), listings::is_listing_file)?;
            let merged = listings::merge_listings(&sources, *policy)?;
            let records: Vec<_> = merged.into_iter().map(|s| s.record).collect();

            std::fs::create_dir_all(&config.output_dir)?;
            write_json_pretty(&config.output_dir.join(format!("{name}_raw.json")), &records)?;
            let paths = export_table(&final_table(&records), &config.output_dir, name, "Inmuebles")?;
            info!("Consolidated {} listings into {}", records.len(), paths.xlsx.display());
        }

        Commands::Export { input, out } => {
            let records = listings::load_listings(input)?;
            if records.is_empty() {
                bail!("No listings found in {}", input.display());
            }
            let dir = out.clone().unwrap_or_else(|| parent_dir(input));
            let stem = input
                .file_stem()
                .map(|s| format!("{}_final", s.to_string_lossy()))
                .unwrap_or_else(|| "final".to_string());
            export_table(&final_table(&records), &dir, &stem, "Inmuebles")?;
        }

        Commands::MergeContacts {
            inputs,
            input_sheet,
            policy,
            name,
        } => {
            let sources = merge::collect_sources(&or_default(inputs, config.output_dir.clone()), contacts::is_contact_file)?;
            let merged = contacts::merge_contacts(&sources, *policy)?;
            let mut records: Vec<_> = merged.into_iter().map(|s| s.record).collect();

            let sheet = match input_sheet {
                Some(path) => match InputTable::load(path) {
                    Ok(table) => Some(table),
                    Err(e) => {
                        warn!("Keeping merge order, input sheet unusable: {}", e);
                        None
                    }
                },
                None => None,
            };
            if let Some(sheet) = &sheet {
                records = contacts::order_by_input(&records, &sheet.urls());
            }

            let (paths, summary) =
                contacts::write_contact_deliverable(&records, sheet.as_ref(), &config.output_dir, name)?;
            println!("{}", paths.json.display());
            println!("{}", paths.csv.display());
            println!("{}", paths.xlsx.display());
            println!(
                "Totals: {} | with phone: {} | without phone: {}",
                summary.total, summary.with_phone, summary.without_phone
            );
        }

        Commands::AttachContacts { master, contacts: inputs, name } => {
            let master_table =
                InputTable::load(master).with_context(|| format!("Failed to load master sheet {}", master.display()))?;
            let sources = merge::collect_sources(&or_default(inputs, config.output_dir.clone()), contacts::is_contact_file)?;
            let hits = contacts::collect_contact_hits(&sources)?;
            let report = contacts::attach_contacts(&master_table, &hits);
            export_table(&report.table, &config.output_dir, name, "Sheet1")?;
        }

        Commands::Count { inputs } => {
            let sources = merge::collect_sources(&or_default(inputs, config.batches_dir()), |p| {
                listings::is_listing_file(p) || p.extension().is_some_and(|e| e == "json")
            })?;
            let unique = listings::count_unique(&sources)?;
            println!("Unique listings: {}", unique);
        }
    }

    Ok(())
}

fn or_default(inputs: &[PathBuf], fallback: PathBuf) -> Vec<PathBuf> {
    if inputs.is_empty() {
        vec![fallback]
    } else {
        inputs.to_vec()
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

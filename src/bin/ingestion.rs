//! Ingestion pipeline binary entry point.
//!
//! Loads paper metadata from a JSON file, projects every paper into its
//! canonical, category, author and keyword items, and writes them into the
//! store snapshot shared with the `query` and `api_server` binaries.
//!
//! # Examples
//!
//! Ingest into the default snapshot:
//! ```bash
//! ingestion papers.json
//! ```
//!
//! Ingest with strict date validation into a custom snapshot:
//! ```bash
//! ingestion papers.json --store-path data/store.json --strict-dates
//! ```

use anyhow::{Context, Result};
use arxiv_projection::{
    config::{self, DatePolicy, IngestionConfig},
    ingestion::{IngestionPipeline, IngestionStats},
    models::ProjectionKind,
    provider::{json::JsonFilePaperProvider, PaperProvider},
    storage::{memory::MemoryStore, MAX_BATCH_SIZE},
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Ingestion pipeline CLI for building and updating the paper projection store
#[derive(Parser, Debug)]
#[command(
    name = "ingestion",
    version,
    about = "Project arXiv paper metadata into the multi-index store",
    long_about = "Ingestion pipeline that fans each paper out into one item per access pattern (canonical record, categories, authors, keywords) and writes them in bounded, retried batches.

EXAMPLES:
  Ingest into the default snapshot:
    ingestion papers.json

  Custom snapshot location:
    PAPER_STORE_PATH=data/store.json ingestion papers.json

  Reject papers with unparseable dates instead of truncating them:
    ingestion papers.json --strict-dates

  Smaller batches and verbose logging:
    ingestion papers.json --batch-size 10 --log-level debug"
)]
struct IngestionArgs {
    /// Input JSON file: an array of papers or an object with a `papers` array
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Store snapshot file (created if missing)
    #[arg(long, value_name = "PATH", env = config::ENV_STORE_PATH, default_value = config::DEFAULT_STORE_PATH)]
    store_path: PathBuf,

    /// Items per store write (capped at the store ceiling)
    #[arg(long, value_name = "N", default_value_t = MAX_BATCH_SIZE)]
    batch_size: usize,

    /// Attempts per batch before it is reported failed
    #[arg(long, value_name = "N", default_value_t = 5)]
    max_attempts: u32,

    /// Keywords extracted per paper when none are given
    #[arg(long, value_name = "N", default_value_t = 10)]
    keyword_limit: usize,

    /// Skip papers whose publication date cannot be parsed
    #[arg(long)]
    strict_dates: bool,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

impl IngestionArgs {
    fn ingestion_config(&self) -> IngestionConfig {
        IngestionConfig {
            batch_size: self.batch_size,
            max_attempts: self.max_attempts,
            keyword_limit: self.keyword_limit,
            date_policy: if self.strict_dates {
                DatePolicy::Reject
            } else {
                DatePolicy::Truncate
            },
            ..IngestionConfig::default()
        }
    }
}

/// Initialize logging subsystem with the specified level
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Create a progress bar for tracking ingestion
fn create_progress_bar(total: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} papers")
            .context("Invalid progress bar template")?
            .progress_chars("##-"),
    );
    Ok(pb)
}

fn print_summary(stats: &IngestionStats, stored_items: usize) {
    println!("\n╔════════════════════════════════════════╗");
    println!("║      Ingestion Completed               ║");
    println!("╠════════════════════════════════════════╣");
    println!("║ Papers processed:     {:>16} ║", stats.total_processed);
    println!("║ Papers loaded:        {:>16} ║", stats.projected);
    println!("║ Papers skipped:       {:>16} ║", stats.skipped.len());
    println!("║ Items created:        {:>16} ║", stats.planned.total());
    println!("║ Items written:        {:>16} ║", stats.write.items_written());
    println!("║ Items in store:       {:>16} ║", stored_items);
    println!("║ Denormalization:      {:>15.1}x ║", stats.denormalization_factor());
    println!("╠════════════════════════════════════════╣");
    for kind in ProjectionKind::ALL {
        println!(
            "║ {:<9} {:>8} ({:>5.1} per paper avg) ║",
            kind.label(),
            stats.planned.get(kind),
            stats.average_per_paper(kind)
        );
    }
    println!("╠════════════════════════════════════════╣");
    println!("║ Store calls:          {:>16} ║", stats.write.store_calls);
    println!("║ Retries:              {:>16} ║", stats.write.retries);
    println!("║ Failed batches:       {:>16} ║", stats.write.failed_batches.len());
    println!("║ Date fallbacks:       {:>16} ║", stats.date_fallbacks);
    println!("║ Elapsed time:         {:>15.2}s ║", stats.elapsed_ms as f64 / 1000.0);
    println!("╚════════════════════════════════════════╝");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = IngestionArgs::parse();

    // Initialize logging
    init_logging(&args.log_level).context("Failed to initialize logging")?;

    info!("Starting paper ingestion pipeline");
    debug!("CLI arguments: {:?}", args);

    // Validate input file exists
    if !args.input.exists() {
        error!("Input file does not exist: {:?}", args.input);
        anyhow::bail!("Input file not found: {:?}", args.input);
    }

    // Ensure the snapshot directory exists
    if let Some(parent) = args.store_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create store directory: {:?}", parent))?;
            info!("Created store directory: {:?}", parent);
        }
    }

    let store = MemoryStore::open(&args.store_path)
        .await
        .with_context(|| format!("Failed to open store snapshot {:?}", args.store_path))?;
    info!("Store snapshot: {:?}", args.store_path);

    // Load paper provider
    let provider = JsonFilePaperProvider::from_file(&args.input)
        .await
        .with_context(|| format!("Failed to load papers from {:?}", args.input))?;
    let papers = provider.fetch_papers().await?;
    info!("Found {} papers from {}", papers.len(), provider.name());

    if papers.is_empty() {
        warn!("No papers found in input file");
        return Ok(());
    }

    let config = args.ingestion_config();
    info!(
        "Processing papers with batch_size={}, max_attempts={}, date_policy={:?}",
        config.effective_batch_size(),
        config.max_attempts,
        config.date_policy
    );
    let mut pipeline = IngestionPipeline::new(store, config);

    let progress = create_progress_bar(papers.len())?;
    let stats = pipeline
        .ingest_papers_with_progress(&papers, |done| progress.set_position(done as u64))
        .await;
    progress.finish();

    pipeline
        .store()
        .save()
        .await
        .context("Failed to save store snapshot")?;
    let stored_items = pipeline
        .stored_items()
        .await
        .context("Failed to count stored items")?;

    print_summary(&stats, stored_items);

    for skipped in &stats.skipped {
        warn!(
            "Skipped {}: {}",
            skipped.arxiv_id.as_deref().unwrap_or("<no id>"),
            skipped.reason
        );
    }

    if !stats.write.failed_batches.is_empty() {
        let papers = stats.papers_with_failed_writes();
        error!(
            "{} papers have unwritten items; re-run ingestion to converge: {}",
            papers.len(),
            papers.join(", ")
        );
        anyhow::bail!("{} batches failed", stats.write.failed_batches.len());
    }

    info!("Ingestion pipeline completed successfully");

    Ok(())
}

//! Query CLI binary.
//!
//! Runs one of the five read patterns against the store snapshot and prints the
//! response envelope as JSON or a table.
//!
//! # Examples
//!
//! ```bash
//! query recent cs.LG --limit 5
//! query author "Alice Smith" --format table
//! query get 2301.00001
//! query daterange cs.LG 2023-01-01 2023-01-31
//! query keyword transformer --limit 10
//! ```

use anyhow::{Context, Result};
use arxiv_projection::{
    config,
    query::{QueryEngine, QueryResponse},
    storage::memory::MemoryStore,
};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format for query responses
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Full response envelope as pretty-printed JSON
    Json,
    /// Human-readable table
    Table,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Most recent papers in a category
    Recent {
        category: String,
        #[arg(long, default_value_t = config::DEFAULT_QUERY_LIMIT)]
        limit: usize,
    },
    /// All papers by an author (exact name)
    Author { author_name: String },
    /// One paper by arXiv id
    Get { arxiv_id: String },
    /// Papers in a category published between two dates (inclusive)
    Daterange {
        category: String,
        /// First day, YYYY-MM-DD
        start_date: String,
        /// Last day, YYYY-MM-DD
        end_date: String,
    },
    /// Most recent papers for a keyword
    Keyword {
        keyword: String,
        #[arg(long, default_value_t = config::DEFAULT_QUERY_LIMIT)]
        limit: usize,
    },
}

/// Query the paper projection store
#[derive(Parser, Debug)]
#[command(
    name = "query",
    version,
    about = "Run read patterns against the paper projection store",
    long_about = "Runs one of the five access patterns against the store snapshot written by the ingestion binary.

EXAMPLES:
  Ten newest machine learning papers:
    query recent cs.LG --limit 10

  Everything by one author, as a table:
    query author \"Alice Smith\" --format table

  A month of a category:
    query daterange cs.LG 2023-01-01 2023-01-31"
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Store snapshot file
    #[arg(long, global = true, value_name = "PATH", env = config::ENV_STORE_PATH, default_value = config::DEFAULT_STORE_PATH)]
    store_path: PathBuf,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Logging verbosity level
    #[arg(long, global = true, default_value = "warn", value_name = "LEVEL")]
    log_level: String,
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

async fn execute(engine: &QueryEngine<MemoryStore>, command: &Command) -> Result<QueryResponse> {
    let response = match command {
        Command::Recent { category, limit } => engine.recent_in_category(category, Some(*limit)).await,
        Command::Author { author_name } => engine.papers_by_author(author_name).await,
        Command::Get { arxiv_id } => engine.get_by_id(arxiv_id).await,
        Command::Daterange {
            category,
            start_date,
            end_date,
        } => engine.papers_in_date_range(category, start_date, end_date).await,
        Command::Keyword { keyword, limit } => engine.papers_by_keyword(keyword, Some(*limit)).await,
    };
    response.with_context(|| format!("Query failed: {:?}", command))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        text.to_string()
    }
}

/// Format a response as a pretty table
fn format_response_table(response: &QueryResponse) -> String {
    if response.results.is_empty() {
        return "No results found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("#").add_attribute(Attribute::Bold),
        Cell::new("arXiv id").add_attribute(Attribute::Bold),
        Cell::new("Date").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("Authors").add_attribute(Attribute::Bold),
        Cell::new("Categories").add_attribute(Attribute::Bold),
    ]);

    for (idx, item) in response.results.iter().enumerate() {
        let paper = &item.payload;
        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(&paper.arxiv_id).fg(Color::Cyan),
            Cell::new(&paper.published_date),
            Cell::new(truncate(&paper.title, 60)),
            Cell::new(truncate(&paper.authors.join(", "), 40)),
            Cell::new(paper.categories.join(" ")),
        ]);
    }

    table.to_string()
}

/// Format a response as JSON
fn format_response_json(response: &QueryResponse) -> Result<String> {
    serde_json::to_string_pretty(response).with_context(|| "Failed to serialize response to JSON")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args.log_level);
    debug!("CLI arguments: {:?}", args);

    if !args.store_path.exists() {
        anyhow::bail!(
            "Store snapshot not found: {}\n\
             Please run the ingestion binary first to create it.",
            args.store_path.display()
        );
    }

    info!("Loading store from: {}", args.store_path.display());
    let store = MemoryStore::open(&args.store_path)
        .await
        .with_context(|| format!("Failed to open store snapshot {}", args.store_path.display()))?;
    let engine = QueryEngine::new(store);

    let response = execute(&engine, &args.command).await?;

    match args.format {
        OutputFormat::Table => {
            println!("{}", format_response_table(&response));
            println!(
                "\n{}: {} results in {}ms",
                response.query_type, response.count, response.execution_time_ms
            );
        }
        OutputFormat::Json => {
            println!("{}", format_response_json(&response)?);
        }
    }

    Ok(())
}

//! Read API server binary entry point.
//!
//! Loads the store snapshot written by the ingestion binary and serves the five
//! read patterns over HTTP until interrupted.
//!
//! ```bash
//! api_server --port 8080
//! PAPER_STORE_PATH=data/store.json api_server
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use arxiv_projection::{
    config::ServerConfig,
    query::QueryEngine,
    server::{build_router, serve},
    storage::{memory::MemoryStore, ProjectionStore},
};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// HTTP read API over the paper projection store
#[derive(Parser, Debug)]
#[command(
    name = "api_server",
    version,
    about = "Serve the paper projection store over HTTP",
    long_about = "Serves GET /papers/recent, /papers/author/{name}, /papers/{id}, /papers/search and /papers/keyword/{kw} from the store snapshot.

Settings resolve in order: command-line flag, then PAPER_API_HOST / PAPER_API_PORT / PAPER_STORE_PATH, then defaults.

EXAMPLES:
  Serve the default snapshot on port 8080:
    api_server

  Listen on all interfaces:
    api_server --host 0.0.0.0 --port 9000"
)]
struct Args {
    /// Address to bind
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Port to bind
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,

    /// Store snapshot file
    #[arg(long, value_name = "PATH")]
    store_path: Option<PathBuf>,

    /// Result count for bounded patterns called without a limit
    #[arg(long, value_name = "N")]
    default_limit: Option<usize>,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        let mut config = ServerConfig::from_env();
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(path) = &self.store_path {
            config.store_path = path.clone();
        }
        if let Some(limit) = self.default_limit {
            config.default_limit = limit;
        }
        config
    }
}

/// Initialize logging subsystem with the specified level
fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = args.server_config();
    debug!("Server configuration: {:?}", config);

    if !config.store_path.exists() {
        warn!(
            "Store snapshot {} not found; serving an empty store",
            config.store_path.display()
        );
    }

    let store = MemoryStore::open(&config.store_path)
        .await
        .with_context(|| format!("Failed to open store snapshot {}", config.store_path.display()))?;
    let items = store.count_items().await.context("Failed to count stored items")?;
    info!("Loaded {} items from {}", items, config.store_path.display());

    let engine = QueryEngine::new(store).with_default_limit(config.default_limit);
    let router = build_router(engine);

    serve(router, &config.bind_address())
        .await
        .context("Read API server failed")?;

    info!("Read API server stopped");
    Ok(())
}

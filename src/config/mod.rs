//! Runtime configuration.
//!
//! Defaults live in `Default` impls; `from_env` overlays environment variables, and
//! the binaries overlay command-line flags on top of that.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::keywords::DEFAULT_KEYWORD_LIMIT;
use crate::storage::MAX_BATCH_SIZE;

/// Environment variable naming the store snapshot file.
pub const ENV_STORE_PATH: &str = "PAPER_STORE_PATH";

/// Environment variable overriding the API bind host.
pub const ENV_API_HOST: &str = "PAPER_API_HOST";

/// Environment variable overriding the API port.
pub const ENV_API_PORT: &str = "PAPER_API_PORT";

/// Default snapshot file shared by the binaries.
pub const DEFAULT_STORE_PATH: &str = "papers-store.json";

/// Default result count for the bounded read patterns.
pub const DEFAULT_QUERY_LIMIT: usize = 20;

/// What to do with a publication timestamp that cannot be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatePolicy {
    /// Keep the first ten characters of the raw value as the date
    #[default]
    Truncate,

    /// Reject the paper
    Reject,
}

/// Ingestion pipeline tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Items per store write; capped at the store ceiling
    pub batch_size: usize,

    /// Attempts per batch (first try included) before it is reported failed
    pub max_attempts: u32,

    /// Backoff before the first retry, doubled on each further retry
    pub base_backoff_ms: u64,

    /// Upper bound on a single backoff
    pub max_backoff_ms: u64,

    /// Keywords extracted per paper when none are given explicitly
    pub keyword_limit: usize,

    pub date_policy: DatePolicy,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            max_attempts: 5,
            base_backoff_ms: 50,
            max_backoff_ms: 2_000,
            keyword_limit: DEFAULT_KEYWORD_LIMIT,
            date_policy: DatePolicy::Truncate,
        }
    }
}

impl IngestionConfig {
    /// Effective batch size: at least one, never above the store ceiling.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, MAX_BATCH_SIZE)
    }

    /// Backoff before retry number `retry` (zero-based).
    pub fn backoff_ms(&self, retry: u32) -> u64 {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        self.base_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms)
    }
}

/// Read API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Snapshot file the server loads its store from
    pub store_path: PathBuf,

    /// Limit applied when a bounded pattern is called without one
    pub default_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            default_limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

impl ServerConfig {
    /// Defaults overlaid with `PAPER_API_HOST`, `PAPER_API_PORT` and
    /// `PAPER_STORE_PATH`. An unparseable port is ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(host) = std::env::var(ENV_API_HOST) {
            config.host = host;
        }
        if let Ok(port) = std::env::var(ENV_API_PORT) {
            match port.parse() {
                Ok(port) => config.port = port,
                Err(_) => warn!("Ignoring invalid {}={}", ENV_API_PORT, port),
            }
        }
        if let Some(path) = store_path_from_env() {
            config.store_path = path;
        }
        config
    }

    /// The `host:port` string to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Store snapshot path from `PAPER_STORE_PATH`, if set.
pub fn store_path_from_env() -> Option<PathBuf> {
    std::env::var(ENV_STORE_PATH).ok().map(PathBuf::from)
}

//! Paper provider module.
//!
//! A `PaperProvider` yields canonical paper records for the ingestion pipeline
//! without the pipeline knowing where they come from. The only bundled source is
//! a local JSON export (see [`json`]).

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Paper;

pub mod json;

/// Errors that can occur when fetching papers from a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Failed to read from the data source
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The source is not in a recognised layout
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Provider error: {0}")]
    Other(String),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Trait for sourcing canonical paper records.
///
/// Providers return records as found in the source. Records missing an id or
/// carrying an odd timestamp are passed through; the projection planner decides
/// what to do with them so a single bad record never fails the whole fetch.
#[async_trait]
pub trait PaperProvider: Send + Sync {
    /// Fetch every paper the source holds, in source order.
    ///
    /// # Errors
    /// Returns `ProviderError` if the source cannot be read or is not in a
    /// recognised layout
    async fn fetch_papers(&self) -> ProviderResult<Vec<Paper>>;

    /// Fetch at most `limit` papers, in source order.
    async fn fetch_papers_limit(&self, limit: usize) -> ProviderResult<Vec<Paper>> {
        let all_papers = self.fetch_papers().await?;
        Ok(all_papers.into_iter().take(limit).collect())
    }

    /// Number of papers available.
    async fn count_papers(&self) -> ProviderResult<usize> {
        self.fetch_papers().await.map(|papers| papers.len())
    }

    /// Human-readable name used in logs.
    fn name(&self) -> &str;
}

//! Ingestion pipeline module.
//!
//! Reads canonical papers, plans each paper's projection items and streams them
//! through the idempotent batch writer. A bad record is skipped and reported,
//! never fatal, and re-running the same input converges on the same store.
//!
//! ```ignore
//! use arxiv_projection::ingestion::IngestionPipeline;
//! use arxiv_projection::provider::json::JsonFilePaperProvider;
//! use arxiv_projection::storage::memory::MemoryStore;
//!
//! let store = MemoryStore::open("papers-store.json").await?;
//! let mut pipeline = IngestionPipeline::new(store, IngestionConfig::default());
//!
//! let provider = JsonFilePaperProvider::from_file("papers.json").await?;
//! let stats = pipeline.ingest_from_provider(&provider).await?;
//! println!("{}", stats);
//! pipeline.store().save().await?;
//! ```

pub mod writer;

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::IngestionConfig;
use crate::models::{KindCounts, Paper, ProjectionKind};
use crate::projection::{ProjectionPlan, ProjectionPlanner};
use crate::provider::{PaperProvider, ProviderError};
use crate::storage::ProjectionStore;

pub use writer::{BatchWriter, FailedBatch, WriteStats};

/// Errors that abort an ingestion run.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Provider operation failed
    #[error("Provider error: {0}")]
    ProviderError(#[from] ProviderError),

    /// Storage operation failed
    #[error("Storage error: {0}")]
    StorageError(String),
}

/// Result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// A paper the planner refused.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedPaper {
    /// Identifier, when the record had one
    pub arxiv_id: Option<String>,
    pub reason: String,
}

/// Statistics from an ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionStats {
    /// Total number of input papers processed
    pub total_processed: usize,

    /// Papers whose items were planned and handed to the writer
    pub projected: usize,

    pub skipped: Vec<SkippedPaper>,

    /// Papers whose publication date fell back to truncation
    pub date_fallbacks: usize,

    /// Items planned, per projection kind
    pub planned: KindCounts,

    /// Writer counters for the run
    pub write: WriteStats,

    /// Wall-clock duration of the run
    pub elapsed_ms: u64,
}

impl IngestionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a planned paper.
    pub fn record_projected(&mut self, plan: &ProjectionPlan) {
        self.total_processed += 1;
        self.projected += 1;
        self.planned.merge(&plan.breakdown);
        if plan.date_truncated {
            self.date_fallbacks += 1;
        }
    }

    /// Record a paper the planner rejected.
    pub fn record_skipped(&mut self, arxiv_id: Option<String>, reason: impl Into<String>) {
        self.total_processed += 1;
        self.skipped.push(SkippedPaper {
            arxiv_id,
            reason: reason.into(),
        });
    }

    /// Items stored per projected paper.
    pub fn denormalization_factor(&self) -> f64 {
        if self.projected == 0 {
            return 0.0;
        }
        self.planned.total() as f64 / self.projected as f64
    }

    /// Average items of `kind` per projected paper.
    pub fn average_per_paper(&self, kind: ProjectionKind) -> f64 {
        if self.projected == 0 {
            return 0.0;
        }
        self.planned.get(kind) as f64 / self.projected as f64
    }

    /// Distinct ids of papers with at least one item that was never written.
    pub fn papers_with_failed_writes(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for batch in &self.write.failed_batches {
            for id in &batch.entity_ids {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        }
        ids
    }

    /// Whether every planned item was written and no paper was skipped.
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.write.failed_batches.is_empty()
    }
}

impl fmt::Display for IngestionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Loaded {} papers", self.projected)?;
        writeln!(f, "Created {} items (denormalized)", self.planned.total())?;
        writeln!(f, "Denormalization factor: {:.1}x", self.denormalization_factor())?;
        writeln!(f)?;
        writeln!(f, "Storage breakdown:")?;
        for kind in ProjectionKind::ALL {
            writeln!(
                f,
                "  - {} items: {} ({:.1} per paper avg)",
                kind.label(),
                self.planned.get(kind),
                self.average_per_paper(kind)
            )?;
        }
        if !self.skipped.is_empty() {
            writeln!(f)?;
            writeln!(f, "Skipped papers: {}", self.skipped.len())?;
        }
        if !self.write.failed_batches.is_empty() {
            writeln!(
                f,
                "Failed batches: {} (papers: {})",
                self.write.failed_batches.len(),
                self.papers_with_failed_writes().join(", ")
            )?;
        }
        write!(f, "Done in {:.2}s.", self.elapsed_ms as f64 / 1000.0)
    }
}

/// Ingestion pipeline coordinator.
///
/// Owns a planner and a batch writer over the store. Papers are processed
/// sequentially; items of consecutive papers share write batches.
pub struct IngestionPipeline<S: ProjectionStore> {
    planner: ProjectionPlanner,
    writer: BatchWriter<S>,
}

impl<S: ProjectionStore> IngestionPipeline<S> {
    pub fn new(store: S, config: IngestionConfig) -> Self {
        let planner = ProjectionPlanner::new(config.keyword_limit, config.date_policy);
        Self {
            planner,
            writer: BatchWriter::new(store, config),
        }
    }

    pub fn planner(&self) -> &ProjectionPlanner {
        &self.planner
    }

    pub fn store(&self) -> &S {
        self.writer.store()
    }

    pub fn into_store(self) -> S {
        self.writer.into_store()
    }

    /// Ingest a slice of papers.
    ///
    /// # Returns
    /// Statistics about the run. Skipped papers and failed batches are reported
    /// there rather than as an error.
    pub async fn ingest_papers(&mut self, papers: &[Paper]) -> IngestionStats {
        self.ingest_papers_with_progress(papers, |_| {}).await
    }

    /// Ingest a slice of papers, calling `on_paper` with the running count after
    /// each one.
    pub async fn ingest_papers_with_progress<F>(&mut self, papers: &[Paper], mut on_paper: F) -> IngestionStats
    where
        F: FnMut(usize),
    {
        let started = std::time::Instant::now();
        let mut stats = IngestionStats::new();

        for (index, paper) in papers.iter().enumerate() {
            match self.planner.plan(paper) {
                Ok(plan) => {
                    stats.record_projected(&plan);
                    self.writer.extend(plan.items).await;
                }
                Err(e) => {
                    warn!("Skipping paper: {}", e);
                    stats.record_skipped(paper.arxiv_id.clone(), e.to_string());
                }
            }
            on_paper(index + 1);
        }

        stats.write = self.writer.finish().await;
        stats.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            "Ingested {} papers into {} items ({} skipped, {} failed batches)",
            stats.projected,
            stats.write.items_written(),
            stats.skipped.len(),
            stats.write.failed_batches.len()
        );
        stats
    }

    /// Fetch every paper from a provider and ingest it.
    ///
    /// # Errors
    /// Returns `IngestionError::ProviderError` if the provider cannot be read
    pub async fn ingest_from_provider<P>(&mut self, provider: &P) -> IngestionResult<IngestionStats>
    where
        P: PaperProvider,
    {
        let papers = provider.fetch_papers().await?;
        info!("Ingesting {} papers from {}", papers.len(), provider.name());
        Ok(self.ingest_papers(&papers).await)
    }

    /// Number of items currently in the store.
    pub async fn stored_items(&self) -> IngestionResult<usize> {
        self.store()
            .count_items()
            .await
            .map_err(|e| IngestionError::StorageError(e.to_string()))
    }
}

//! arXiv Projection - a denormalized multi-index store for research paper metadata.
//!
//! Each paper is written once per access pattern it must serve, so every read is
//! a single-partition range query on a sorted key-value store. Storage is traded
//! for read latency: one paper fans out into roughly ten items.
//!
//! # Architecture
//!
//! The system is organized into several key modules:
//!
//! - **models**: Core data structures (Paper, PaperPayload, ProjectionItem)
//! - **keywords**: Frequency-ranked keyword extraction from abstracts
//! - **keys**: Composite key encoding and date normalization
//! - **projection**: Planning every projection item for one paper
//! - **storage**: The store contract and an in-memory store with snapshot files
//! - **ingestion**: The ingestion pipeline and the idempotent batch writer
//! - **query**: The five read patterns
//! - **server**: HTTP read API
//! - **provider**: Paper sources (JSON files)
//! - **config**: Runtime configuration
//!
//! # Workflow
//!
//! ## Offline Ingestion
//!
//! 1. Load canonical paper records from a provider
//! 2. Normalize the publication date and extract keywords
//! 3. Plan the canonical, category, author and keyword items
//! 4. Write items in bounded, deduplicated, retried batches
//!
//! ## Online Reads
//!
//! 1. Receive a request for one access pattern
//! 2. Encode the partition key (and sort key range)
//! 3. Run one range query against the primary key or a secondary index
//! 4. Return the envelope with results and timing
//!
//! # Example
//!
//! ```ignore
//! use arxiv_projection::{
//!     config::IngestionConfig,
//!     ingestion::IngestionPipeline,
//!     query::QueryEngine,
//!     storage::memory::MemoryStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut pipeline = IngestionPipeline::new(MemoryStore::new(), IngestionConfig::default());
//!     let stats = pipeline.ingest_papers(&papers).await;
//!     println!("{}", stats);
//!
//!     let engine = QueryEngine::new(pipeline.into_store());
//!     let response = engine.papers_by_keyword("transformer", Some(10)).await?;
//!     for item in response.results {
//!         println!("{}: {}", item.payload.arxiv_id, item.payload.title);
//!     }
//!
//!     Ok(())
//! }
//! ```

// Public modules
pub mod config;
pub mod ingestion;
pub mod keys;
pub mod keywords;
pub mod models;
pub mod projection;
pub mod provider;
pub mod query;
pub mod server;
pub mod storage;

// Re-export commonly used types at the crate root
pub use config::{DatePolicy, IngestionConfig, ServerConfig};
pub use ingestion::{IngestionPipeline, IngestionStats};
pub use models::{Paper, PaperPayload, ProjectionItem, ProjectionKind};
pub use query::{QueryEngine, QueryResponse};
pub use storage::{KeyQuery, ProjectionStore, SortKeyCondition};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

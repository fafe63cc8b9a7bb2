//! Query engine module.
//!
//! Answers the five read patterns with a single-partition range query each. No
//! pattern scans the store or joins across partitions; each one is served by the
//! projection written for it at ingestion time.
//!
//! # Usage
//!
//! ```rust,no_run
//! use arxiv_projection::query::QueryEngine;
//! use arxiv_projection::storage::memory::MemoryStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::open("papers-store.json").await?;
//! let engine = QueryEngine::new(store);
//!
//! let response = engine.recent_in_category("cs.LG", Some(5)).await?;
//! for item in &response.results {
//!     println!("{} {}", item.payload.published_date, item.payload.title);
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::config::DEFAULT_QUERY_LIMIT;
use crate::keys::{self, AUTHOR_INDEX, KEYWORD_INDEX, PAPER_ID_INDEX};
use crate::models::ProjectionItem;
use crate::storage::{KeyQuery, ProjectionStore, SortKeyCondition};

/// Errors that can occur during query processing.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Invalid query parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Storage access failed
    #[error("Storage error: {0}")]
    StorageError(String),
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// The envelope returned by every read pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Name of the pattern that produced the response
    pub query_type: String,

    /// The parameters as the pattern received them
    pub parameters: serde_json::Value,

    pub results: Vec<ProjectionItem>,

    /// Always equal to `results.len()`
    pub count: usize,

    pub execution_time_ms: u64,
}

impl QueryResponse {
    fn new(query_type: &str, parameters: serde_json::Value, results: Vec<ProjectionItem>, started: Instant) -> Self {
        Self {
            query_type: query_type.to_string(),
            parameters,
            count: results.len(),
            results,
            execution_time_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Executes read patterns against a projection store.
pub struct QueryEngine<S: ProjectionStore> {
    store: S,
    default_limit: usize,
}

impl<S: ProjectionStore> QueryEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            default_limit: DEFAULT_QUERY_LIMIT,
        }
    }

    /// Use `limit` for bounded patterns called without an explicit limit.
    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Most recent papers in a category, newest first.
    ///
    /// # Errors
    /// Returns `QueryError::InvalidQuery` for an empty category or a zero limit
    pub async fn recent_in_category(&self, category: &str, limit: Option<usize>) -> QueryResult<QueryResponse> {
        let started = Instant::now();
        require_non_empty("category", category)?;
        let limit = self.resolve_limit(limit)?;

        let query = KeyQuery::partition(keys::category_partition(category))
            .with_limit(Some(limit))
            .reversed();
        let results = self.run(&query).await?;

        Ok(QueryResponse::new(
            "recent_in_category",
            json!({ "category": category, "limit": limit }),
            results,
            started,
        ))
    }

    /// Every paper by an author, oldest first. The name must match exactly.
    pub async fn papers_by_author(&self, author: &str) -> QueryResult<QueryResponse> {
        let started = Instant::now();
        require_non_empty("author", author)?;

        let query = KeyQuery::partition(keys::author_partition(author)).on_index(AUTHOR_INDEX);
        let results = self.run(&query).await?;

        Ok(QueryResponse::new(
            "papers_by_author",
            json!({ "author": author }),
            results,
            started,
        ))
    }

    /// The canonical record of one paper. A miss yields an empty result set.
    pub async fn get_by_id(&self, arxiv_id: &str) -> QueryResult<QueryResponse> {
        let started = Instant::now();
        require_non_empty("arxiv_id", arxiv_id)?;

        let query = KeyQuery::partition(keys::paper_partition(arxiv_id))
            .on_index(PAPER_ID_INDEX)
            .with_limit(Some(1));
        let results = self.run(&query).await?;

        Ok(QueryResponse::new(
            "get_paper_by_id",
            json!({ "arxiv_id": arxiv_id }),
            results,
            started,
        ))
    }

    /// Papers in a category published between two dates, both inclusive,
    /// oldest first.
    ///
    /// # Arguments
    /// * `start` - First day, `YYYY-MM-DD`
    /// * `end` - Last day, `YYYY-MM-DD`
    ///
    /// # Errors
    /// Returns `QueryError::InvalidQuery` if a date is not a valid `YYYY-MM-DD`
    /// date or `start` is after `end`
    pub async fn papers_in_date_range(&self, category: &str, start: &str, end: &str) -> QueryResult<QueryResponse> {
        let started = Instant::now();
        require_non_empty("category", category)?;
        let start_date = keys::parse_query_date(start)
            .ok_or_else(|| QueryError::InvalidQuery(format!("start must be YYYY-MM-DD, got {:?}", start)))?;
        let end_date = keys::parse_query_date(end)
            .ok_or_else(|| QueryError::InvalidQuery(format!("end must be YYYY-MM-DD, got {:?}", end)))?;
        if start_date > end_date {
            return Err(QueryError::InvalidQuery(format!(
                "start {} is after end {}",
                start, end
            )));
        }

        let (low, high) = keys::date_range_bounds(start, end);
        let query = KeyQuery::partition(keys::category_partition(category))
            .with_condition(SortKeyCondition::Between(low, high));
        let results = self.run(&query).await?;

        Ok(QueryResponse::new(
            "papers_in_date_range",
            json!({ "category": category, "start": start, "end": end }),
            results,
            started,
        ))
    }

    /// Most recent papers tagged with a keyword, newest first. Matching is
    /// case-insensitive.
    pub async fn papers_by_keyword(&self, keyword: &str, limit: Option<usize>) -> QueryResult<QueryResponse> {
        let started = Instant::now();
        require_non_empty("keyword", keyword)?;
        let limit = self.resolve_limit(limit)?;

        let query = KeyQuery::partition(keys::keyword_partition(keyword))
            .on_index(KEYWORD_INDEX)
            .with_limit(Some(limit))
            .reversed();
        let results = self.run(&query).await?;

        Ok(QueryResponse::new(
            "papers_by_keyword",
            json!({ "keyword": keyword, "limit": limit }),
            results,
            started,
        ))
    }

    async fn run(&self, query: &KeyQuery) -> QueryResult<Vec<ProjectionItem>> {
        let results = self
            .store
            .query(query)
            .await
            .map_err(|e| QueryError::StorageError(e.to_string()))?;
        debug!("Query on {} returned {} items", query.partition_key, results.len());
        Ok(results)
    }

    fn resolve_limit(&self, limit: Option<usize>) -> QueryResult<usize> {
        match limit {
            Some(0) => Err(QueryError::InvalidQuery("limit must be at least 1".to_string())),
            Some(limit) => Ok(limit),
            None => Ok(self.default_limit),
        }
    }
}

fn require_non_empty(name: &str, value: &str) -> QueryResult<()> {
    if value.trim().is_empty() {
        return Err(QueryError::InvalidQuery(format!("{} must not be empty", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestionConfig;
    use crate::ingestion::IngestionPipeline;
    use crate::models::Paper;
    use crate::storage::memory::MemoryStore;
    use crate::storage::{StorageError, StorageResult};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Mock store that fails every call.
    #[derive(Clone, Default)]
    struct FailingStore {
        state: Arc<Mutex<FailingState>>,
    }

    #[derive(Default)]
    struct FailingState {
        query_calls: usize,
    }

    #[async_trait]
    impl ProjectionStore for FailingStore {
        async fn put_batch(&self, _items: Vec<ProjectionItem>, _max: usize) -> StorageResult<Vec<ProjectionItem>> {
            Err(StorageError::Fault("Mock store failure".to_string()))
        }

        async fn query(&self, _query: &KeyQuery) -> StorageResult<Vec<ProjectionItem>> {
            self.state.lock().unwrap().query_calls += 1;
            Err(StorageError::Throttled("Mock store failure".to_string()))
        }

        async fn count_items(&self) -> StorageResult<usize> {
            Err(StorageError::Fault("Mock store failure".to_string()))
        }
    }

    fn create_test_paper(id: &str, published: &str, abstract_text: &str) -> Paper {
        Paper {
            arxiv_id: Some(id.to_string()),
            title: format!("Paper {}", id),
            authors: vec!["Alice Smith".to_string()],
            abstract_text: abstract_text.to_string(),
            categories: vec!["cs.LG".to_string()],
            published: published.to_string(),
            keywords: None,
        }
    }

    async fn engine_with(papers: &[Paper]) -> QueryEngine<MemoryStore> {
        let mut pipeline = IngestionPipeline::new(MemoryStore::new(), IngestionConfig::default());
        pipeline.ingest_papers(papers).await;
        QueryEngine::new(pipeline.into_store())
    }

    fn ids(response: &QueryResponse) -> Vec<&str> {
        response
            .results
            .iter()
            .map(|item| item.payload.arxiv_id.as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_single_paper_visible_through_every_pattern() {
        let engine = engine_with(&[create_test_paper(
            "2301.00001",
            "2023-01-15T00:00:00Z",
            "we propose a new method for graph learning",
        )])
        .await;

        let recent = engine.recent_in_category("cs.LG", Some(1)).await.unwrap();
        assert_eq!(ids(&recent), vec!["2301.00001"]);
        assert_eq!(recent.query_type, "recent_in_category");
        assert_eq!(recent.parameters, json!({ "category": "cs.LG", "limit": 1 }));

        let by_author = engine.papers_by_author("Alice Smith").await.unwrap();
        assert_eq!(by_author.count, 1);

        let by_id = engine.get_by_id("2301.00001").await.unwrap();
        assert_eq!(by_id.count, 1);
        assert_eq!(by_id.results[0].sort_key, "A");

        let in_range = engine
            .papers_in_date_range("cs.LG", "2023-01-01", "2023-01-31")
            .await
            .unwrap();
        assert_eq!(in_range.count, 1);

        for keyword in ["new", "graph", "learning", "GRAPH"] {
            let response = engine.papers_by_keyword(keyword, None).await.unwrap();
            assert_eq!(ids(&response), vec!["2301.00001"], "keyword {}", keyword);
        }
        let propose = engine.papers_by_keyword("propose", None).await.unwrap();
        assert_eq!(propose.count, 0);
    }

    #[tokio::test]
    async fn test_recent_is_newest_first_and_limited() {
        let papers: Vec<Paper> = (1..=5)
            .map(|day| {
                create_test_paper(
                    &format!("2301.0000{}", day),
                    &format!("2023-01-0{}T12:00:00Z", day),
                    "diffusion models",
                )
            })
            .collect();
        let engine = engine_with(&papers).await;

        let recent = engine.recent_in_category("cs.LG", Some(3)).await.unwrap();
        assert_eq!(ids(&recent), vec!["2301.00005", "2301.00004", "2301.00003"]);
        assert_eq!(recent.count, 3);

        let by_keyword = engine.papers_by_keyword("diffusion", Some(2)).await.unwrap();
        assert_eq!(ids(&by_keyword), vec!["2301.00005", "2301.00004"]);

        let by_author = engine.papers_by_author("Alice Smith").await.unwrap();
        assert_eq!(by_author.results.first().map(|i| i.payload.arxiv_id.as_str()), Some("2301.00001"));
        assert_eq!(by_author.count, 5);
    }

    #[tokio::test]
    async fn test_date_range_inclusive_at_both_ends() {
        let engine = engine_with(&[
            create_test_paper("2212.00001", "2022-12-31T23:59:59Z", "alpha"),
            create_test_paper("2301.00001", "2023-01-01T00:00:00Z", "alpha"),
            create_test_paper("2301.00002", "2023-01-15", "alpha"),
            create_test_paper("2301.00003", "2023-01-16", "alpha"),
            create_test_paper("2301.00004", "2023-01-31T23:59:59Z", "alpha"),
            create_test_paper("2302.00001", "2023-02-01T00:00:00Z", "alpha"),
        ])
        .await;

        let month = engine
            .papers_in_date_range("cs.LG", "2023-01-01", "2023-01-31")
            .await
            .unwrap();
        assert_eq!(ids(&month), vec!["2301.00001", "2301.00002", "2301.00003", "2301.00004"]);

        let response = engine
            .papers_in_date_range("cs.LG", "2023-01-15", "2023-01-16")
            .await
            .unwrap();
        assert_eq!(ids(&response), vec!["2301.00002", "2301.00003"]);

        let single_day = engine
            .papers_in_date_range("cs.LG", "2023-01-31", "2023-01-31")
            .await
            .unwrap();
        assert_eq!(ids(&single_day), vec!["2301.00004"]);
    }

    #[tokio::test]
    async fn test_get_by_id_miss_is_empty() {
        let engine = engine_with(&[]).await;
        let response = engine.get_by_id("9999.99999").await.unwrap();
        assert_eq!(response.count, 0);
        assert!(response.results.is_empty());
    }

    #[tokio::test]
    async fn test_reingest_updates_without_duplicates() {
        let mut pipeline = IngestionPipeline::new(MemoryStore::new(), IngestionConfig::default());
        let original = create_test_paper("2301.00001", "2023-01-15", "graph learning");
        pipeline.ingest_papers(&[original.clone()]).await;

        let mut revised = original.clone();
        revised.title = "Graph Learning, Revised".to_string();
        pipeline.ingest_papers(&[revised]).await;

        let engine = QueryEngine::new(pipeline.into_store());
        let recent = engine.recent_in_category("cs.LG", None).await.unwrap();
        assert_eq!(recent.count, 1);
        assert_eq!(recent.results[0].payload.title, "Graph Learning, Revised");

        let by_keyword = engine.papers_by_keyword("graph", None).await.unwrap();
        assert_eq!(by_keyword.count, 1);
        assert_eq!(by_keyword.results[0].payload.title, "Graph Learning, Revised");
    }

    #[tokio::test]
    async fn test_invalid_parameters() {
        let engine = engine_with(&[]).await;

        assert!(matches!(
            engine.recent_in_category("cs.LG", Some(0)).await,
            Err(QueryError::InvalidQuery(_))
        ));
        assert!(matches!(
            engine.papers_by_author("  ").await,
            Err(QueryError::InvalidQuery(_))
        ));
        assert!(matches!(
            engine.papers_in_date_range("cs.LG", "2023-1-5", "2023-01-31").await,
            Err(QueryError::InvalidQuery(_))
        ));
        assert!(matches!(
            engine.papers_in_date_range("cs.LG", "2023-02-01", "2023-01-31").await,
            Err(QueryError::InvalidQuery(_))
        ));
        assert!(matches!(
            engine.papers_by_keyword("", None).await,
            Err(QueryError::InvalidQuery(_))
        ));
    }

    #[tokio::test]
    async fn test_default_limit_applied() {
        let engine = engine_with(&[]).await.with_default_limit(7);
        let response = engine.recent_in_category("cs.LG", None).await.unwrap();
        assert_eq!(response.parameters["limit"], 7);
    }

    #[tokio::test]
    async fn test_storage_error_propagation() {
        let store = FailingStore::default();
        let engine = QueryEngine::new(store.clone());

        let err = engine.papers_by_author("Alice Smith").await.unwrap_err();
        assert!(matches!(err, QueryError::StorageError(_)));

        // Reads are never retried
        assert_eq!(store.state.lock().unwrap().query_calls, 1);
    }
}

//! Store adapter abstraction and implementations.
//!
//! This module defines the contract the projection layer requires from a sorted
//! key-value store: a primary hash+range key, several secondary hash+range
//! indexes, batched puts with overwrite-by-key semantics, and single-partition
//! range queries with limit and reverse-order options.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::ProjectionItem;

/// Largest batch a single `put_batch` call accepts.
pub const MAX_BATCH_SIZE: usize = 25;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Provisioned write capacity exceeded (transient)
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Request throttled (transient)
    #[error("Request throttled: {0}")]
    Throttled(String),

    /// Malformed request (e.g. batch too large, empty key)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Query named an index the store does not have
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Snapshot read/write or serialization failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Non-retryable infrastructure fault
    #[error("Store fault: {0}")]
    Fault(String),
}

impl StorageError {
    /// Whether the failed operation may succeed if retried after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::CapacityExceeded(_) | StorageError::Throttled(_)
        )
    }
}

/// Result type for store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Condition on the sort key of a range query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKeyCondition {
    /// Sort key equals the value
    Equals(String),

    /// Sort key starts with the value
    BeginsWith(String),

    /// Sort key lies in `[low, high]`, both inclusive
    Between(String, String),
}

impl SortKeyCondition {
    /// Check whether a sort key satisfies this condition.
    pub fn matches(&self, sort_key: &str) -> bool {
        match self {
            SortKeyCondition::Equals(value) => sort_key == value,
            SortKeyCondition::BeginsWith(prefix) => sort_key.starts_with(prefix.as_str()),
            SortKeyCondition::Between(low, high) => {
                sort_key >= low.as_str() && sort_key <= high.as_str()
            }
        }
    }
}

/// A single-partition range query against the primary key or a secondary index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyQuery {
    /// Partition to scan
    pub partition_key: String,

    /// Optional restriction on the sort key
    pub condition: Option<SortKeyCondition>,

    /// Secondary index to query; `None` queries the primary key
    pub index: Option<String>,

    /// Maximum number of items to return
    pub limit: Option<usize>,

    /// Scan in descending sort key order
    pub reverse: bool,
}

impl KeyQuery {
    /// Query the primary key for one partition.
    pub fn partition(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            ..Default::default()
        }
    }

    pub fn on_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_condition(mut self, condition: SortKeyCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }
}

/// Trait for sorted key-value store backends.
///
/// Implementations must be safe to share between concurrent readers; writes use
/// overwrite-by-key semantics and are never merged with existing items.
#[async_trait]
pub trait ProjectionStore: Send + Sync {
    /// Persist a batch of items, keyed by `(partition_key, sort_key)`.
    ///
    /// # Arguments
    /// * `items` - Items to write; an existing item with the same key is replaced
    /// * `max_batch_size` - Ceiling the caller chunked against
    ///
    /// # Returns
    /// The sub-batch the store could not process. An empty vector means every
    /// item was written.
    ///
    /// # Errors
    /// Returns `StorageError::CapacityExceeded` if the whole batch was rejected for
    /// capacity, or `StorageError::ValidationError` if the batch is malformed
    async fn put_batch(
        &self,
        items: Vec<ProjectionItem>,
        max_batch_size: usize,
    ) -> StorageResult<Vec<ProjectionItem>>;

    /// Run a range query within a single partition.
    ///
    /// # Returns
    /// Matching items in sort key order (descending if `reverse` is set)
    ///
    /// # Errors
    /// Returns `StorageError::IndexNotFound` for an unknown index, or
    /// `StorageError::Throttled` if the store is shedding load
    async fn query(&self, query: &KeyQuery) -> StorageResult<Vec<ProjectionItem>>;

    /// Total number of items in the primary key space.
    async fn count_items(&self) -> StorageResult<usize>;
}

#[async_trait]
impl<T: ProjectionStore + ?Sized> ProjectionStore for Arc<T> {
    async fn put_batch(
        &self,
        items: Vec<ProjectionItem>,
        max_batch_size: usize,
    ) -> StorageResult<Vec<ProjectionItem>> {
        (**self).put_batch(items, max_batch_size).await
    }

    async fn query(&self, query: &KeyQuery) -> StorageResult<Vec<ProjectionItem>> {
        (**self).query(query).await
    }

    async fn count_items(&self) -> StorageResult<usize> {
        (**self).count_items().await
    }
}

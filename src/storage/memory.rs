//! In-memory sorted store implementation.
//!
//! This module provides a `ProjectionStore` backed by ordered maps: one map per
//! primary partition, plus one ordered set per secondary index partition that
//! points back into the primary key space. The whole store can be saved to and
//! loaded from a JSON snapshot file so that separate processes (the ingestion
//! binary and the API server) can share data.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{KeyQuery, ProjectionStore, StorageError, StorageResult, MAX_BATCH_SIZE};
use crate::keys::{AUTHOR_INDEX, KEYWORD_INDEX, PAPER_ID_INDEX};
use crate::models::ProjectionItem;

const SNAPSHOT_VERSION: u32 = 1;

/// Entry of a secondary index partition: `(index sort key, primary pk, primary sk)`.
type IndexEntry = (String, String, String);

#[derive(Default)]
struct Tables {
    /// partition key -> sort key -> item
    primary: BTreeMap<String, BTreeMap<String, ProjectionItem>>,

    /// index name -> index partition key -> ordered entries
    secondary: HashMap<String, BTreeMap<String, BTreeSet<IndexEntry>>>,
}

impl Tables {
    fn insert(&mut self, item: ProjectionItem) {
        let pk = item.partition_key.clone();
        let sk = item.sort_key.clone();

        let previous = self
            .primary
            .entry(pk.clone())
            .or_default()
            .insert(sk.clone(), item);

        if let Some(old) = previous {
            self.unlink_secondary(&old);
        }

        // Re-borrow the stored item to link its secondary projection
        let secondary = self
            .primary
            .get(&pk)
            .and_then(|partition| partition.get(&sk))
            .and_then(|stored| stored.secondary.clone());

        if let Some(secondary) = secondary {
            self.secondary
                .entry(secondary.index)
                .or_default()
                .entry(secondary.partition_key)
                .or_default()
                .insert((secondary.sort_key, pk, sk));
        }
    }

    fn unlink_secondary(&mut self, item: &ProjectionItem) {
        let Some(secondary) = &item.secondary else {
            return;
        };
        if let Some(partitions) = self.secondary.get_mut(&secondary.index) {
            if let Some(entries) = partitions.get_mut(&secondary.partition_key) {
                entries.remove(&(
                    secondary.sort_key.clone(),
                    item.partition_key.clone(),
                    item.sort_key.clone(),
                ));
                if entries.is_empty() {
                    partitions.remove(&secondary.partition_key);
                }
            }
        }
    }

    fn len(&self) -> usize {
        self.primary.values().map(BTreeMap::len).sum()
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    items: Vec<ProjectionItem>,
}

/// In-memory sorted key-value store with secondary indexes.
///
/// Reads take a shared lock and may run concurrently; writes take an exclusive
/// lock for the duration of one batch.
pub struct MemoryStore {
    tables: RwLock<Tables>,

    /// Declared secondary indexes
    indexes: HashSet<String>,

    /// Snapshot file used by `open` and `save`
    snapshot_path: Option<PathBuf>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store with the author, paper-id and keyword indexes declared.
    pub fn new() -> Self {
        Self::with_indexes(&[AUTHOR_INDEX, PAPER_ID_INDEX, KEYWORD_INDEX])
    }

    /// Create an empty store declaring exactly the given secondary indexes.
    pub fn with_indexes(indexes: &[&str]) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            indexes: indexes.iter().map(|name| name.to_string()).collect(),
            snapshot_path: None,
        }
    }

    /// Open a store backed by a snapshot file.
    ///
    /// If the file exists its items are loaded; otherwise the store starts empty
    /// and the file is created on the first `save`.
    ///
    /// # Errors
    /// Returns `StorageError::Persistence` if the file exists but cannot be read
    /// or parsed
    pub async fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut store = Self::new();

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|e| {
                    StorageError::Persistence(format!("Invalid snapshot {}: {}", path.display(), e))
                })?;
                if snapshot.version != SNAPSHOT_VERSION {
                    return Err(StorageError::Persistence(format!(
                        "Unsupported snapshot version {} in {}",
                        snapshot.version,
                        path.display()
                    )));
                }
                let count = snapshot.items.len();
                {
                    let mut tables = store.tables.write();
                    for item in snapshot.items {
                        tables.insert(item);
                    }
                }
                info!("Loaded {} items from {}", count, path.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No snapshot at {}, starting empty", path.display());
            }
            Err(e) => {
                return Err(StorageError::Persistence(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        }

        store.snapshot_path = Some(path);
        Ok(store)
    }

    /// Write all items to the snapshot file this store was opened with.
    ///
    /// The snapshot is written to a temporary file and renamed into place.
    ///
    /// # Errors
    /// Returns `StorageError::Persistence` if the store has no snapshot path or
    /// the file cannot be written
    pub async fn save(&self) -> StorageResult<()> {
        let path = self.snapshot_path.as_ref().ok_or_else(|| {
            StorageError::Persistence("Store was not opened from a snapshot file".to_string())
        })?;

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            items: self.all_items(),
        };
        let bytes = serde_json::to_vec(&snapshot)
            .map_err(|e| StorageError::Persistence(format!("Failed to serialize snapshot: {}", e)))?;

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| StorageError::Persistence(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| StorageError::Persistence(format!("Failed to replace {}: {}", path.display(), e)))?;

        info!("Saved {} items to {}", snapshot.items.len(), path.display());
        Ok(())
    }

    /// Every item in primary key order.
    pub fn all_items(&self) -> Vec<ProjectionItem> {
        self.tables
            .read()
            .primary
            .values()
            .flat_map(|partition| partition.values().cloned())
            .collect()
    }

    fn validate_batch(&self, items: &[ProjectionItem], max_batch_size: usize) -> StorageResult<()> {
        let ceiling = max_batch_size.min(MAX_BATCH_SIZE);
        if items.len() > ceiling {
            return Err(StorageError::ValidationError(format!(
                "Batch of {} items exceeds the limit of {}",
                items.len(),
                ceiling
            )));
        }

        let mut seen = HashSet::new();
        for item in items {
            if item.partition_key.is_empty() || item.sort_key.is_empty() {
                return Err(StorageError::ValidationError(
                    "Partition and sort keys must be non-empty".to_string(),
                ));
            }
            if !seen.insert(item.key()) {
                return Err(StorageError::ValidationError(format!(
                    "Batch contains duplicate key ({}, {})",
                    item.partition_key, item.sort_key
                )));
            }
            if let Some(secondary) = &item.secondary {
                if !self.indexes.contains(&secondary.index) {
                    return Err(StorageError::ValidationError(format!(
                        "Item projects into undeclared index {}",
                        secondary.index
                    )));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ProjectionStore for MemoryStore {
    async fn put_batch(
        &self,
        items: Vec<ProjectionItem>,
        max_batch_size: usize,
    ) -> StorageResult<Vec<ProjectionItem>> {
        self.validate_batch(&items, max_batch_size)?;

        let count = items.len();
        let mut tables = self.tables.write();
        for item in items {
            tables.insert(item);
        }
        debug!("Wrote batch of {} items", count);

        Ok(Vec::new())
    }

    async fn query(&self, query: &KeyQuery) -> StorageResult<Vec<ProjectionItem>> {
        let tables = self.tables.read();
        let limit = query.limit.unwrap_or(usize::MAX);
        let accepts = |sort_key: &str| {
            query
                .condition
                .as_ref()
                .map_or(true, |cond| cond.matches(sort_key))
        };

        let results = match &query.index {
            None => {
                let Some(partition) = tables.primary.get(&query.partition_key) else {
                    return Ok(Vec::new());
                };
                let iter: Box<dyn Iterator<Item = (&String, &ProjectionItem)> + '_> = if query.reverse {
                    Box::new(partition.iter().rev())
                } else {
                    Box::new(partition.iter())
                };
                iter.filter(|(sk, _)| accepts(sk))
                    .take(limit)
                    .map(|(_, item)| item.clone())
                    .collect()
            }
            Some(index) => {
                if !self.indexes.contains(index) {
                    return Err(StorageError::IndexNotFound(index.clone()));
                }
                let Some(entries) = tables
                    .secondary
                    .get(index)
                    .and_then(|partitions| partitions.get(&query.partition_key))
                else {
                    return Ok(Vec::new());
                };
                let iter: Box<dyn Iterator<Item = &IndexEntry> + '_> = if query.reverse {
                    Box::new(entries.iter().rev())
                } else {
                    Box::new(entries.iter())
                };
                iter.filter(|(index_sk, _, _)| accepts(index_sk))
                    .take(limit)
                    .filter_map(|(_, pk, sk)| {
                        tables.primary.get(pk).and_then(|partition| partition.get(sk)).cloned()
                    })
                    .collect()
            }
        };

        Ok(results)
    }

    async fn count_items(&self) -> StorageResult<usize> {
        Ok(self.tables.read().len())
    }
}

//! Idempotent batch writer.
//!
//! Items are buffered and written in chunks no larger than the store's batch
//! ceiling. Each chunk is deduplicated by primary key (last occurrence wins), so
//! replaying the same items any number of times converges on the same store
//! contents. Transient store failures are retried with exponential backoff; a
//! chunk that still fails is recorded and skipped, never aborting the run.
//!
//! Writes for different keys of one paper are not atomic: a crash between two
//! chunks leaves that paper partially projected until it is ingested again.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::config::IngestionConfig;
use crate::models::{KindCounts, ProjectionItem, ProjectionKind};
use crate::storage::ProjectionStore;

/// A chunk the writer gave up on.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailedBatch {
    /// Distinct ids of the papers whose items were not written
    pub entity_ids: Vec<String>,

    /// Number of items not written
    pub items: usize,

    /// Store calls made for this chunk
    pub attempts: u32,

    /// Last error reported by the store
    pub error: String,
}

/// Counters kept by the writer over one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WriteStats {
    /// Items confirmed written, per projection kind
    pub written: KindCounts,

    /// `put_batch` calls issued, retries included
    pub store_calls: usize,

    /// Chunks written completely
    pub batches_written: usize,

    /// Retries after a transient failure
    pub retries: usize,

    /// Items dropped because a later item in the same chunk had the same key
    pub duplicates_dropped: usize,

    pub failed_batches: Vec<FailedBatch>,
}

impl WriteStats {
    /// Total items confirmed written.
    pub fn items_written(&self) -> usize {
        self.written.total()
    }
}

/// Buffers projection items and writes them to a store in bounded batches.
pub struct BatchWriter<S: ProjectionStore> {
    store: S,
    config: IngestionConfig,
    buffer: Vec<ProjectionItem>,
    stats: WriteStats,
}

impl<S: ProjectionStore> BatchWriter<S> {
    pub fn new(store: S, config: IngestionConfig) -> Self {
        let capacity = config.effective_batch_size();
        Self {
            store,
            config,
            buffer: Vec::with_capacity(capacity),
            stats: WriteStats::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Counters accumulated since the last `finish`.
    pub fn stats(&self) -> &WriteStats {
        &self.stats
    }

    /// Items waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Buffer one item, flushing a full chunk when the ceiling is reached.
    pub async fn push(&mut self, item: ProjectionItem) {
        self.buffer.push(item);
        if self.buffer.len() >= self.config.effective_batch_size() {
            self.flush().await;
        }
    }

    /// Buffer every item of a sequence, flushing chunks as they fill.
    pub async fn extend<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = ProjectionItem>,
    {
        for item in items {
            self.push(item).await;
        }
    }

    /// Write a whole sequence of items and return the run's counters.
    ///
    /// # Example
    /// ```ignore
    /// let mut writer = BatchWriter::new(store, IngestionConfig::default());
    /// let stats = writer.write_all(items).await;
    /// assert!(stats.failed_batches.is_empty());
    /// ```
    pub async fn write_all<I>(&mut self, items: I) -> WriteStats
    where
        I: IntoIterator<Item = ProjectionItem>,
    {
        self.extend(items).await;
        self.finish().await
    }

    /// Flush the remaining partial chunk and hand back the counters, resetting them.
    pub async fn finish(&mut self) -> WriteStats {
        if !self.buffer.is_empty() {
            self.flush().await;
        }
        std::mem::take(&mut self.stats)
    }

    /// Write everything currently buffered as one chunk.
    async fn flush(&mut self) {
        let chunk = std::mem::take(&mut self.buffer);
        let (mut pending, dropped) = dedupe_last_wins(chunk);
        self.stats.duplicates_dropped += dropped;

        let batch_size = self.config.effective_batch_size();
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            self.stats.store_calls += 1;

            let outcome = self.store.put_batch(pending.clone(), batch_size).await;
            let (unprocessed, last_error) = match outcome {
                Ok(unprocessed) => {
                    let attempted = count_kinds(&pending);
                    let missed = count_kinds(&unprocessed);
                    for kind in ProjectionKind::ALL {
                        let kept = attempted.get(kind).saturating_sub(missed.get(kind));
                        self.stats.written.add(kind, kept);
                    }

                    if unprocessed.is_empty() {
                        self.stats.batches_written += 1;
                        debug!("Wrote batch of {} items in {} attempt(s)", pending.len(), attempts);
                        return;
                    }
                    let message = format!("{} items left unprocessed", unprocessed.len());
                    (unprocessed, message)
                }
                Err(e) if e.is_retryable() => (pending.clone(), e.to_string()),
                Err(e) => {
                    self.record_failure(&pending, attempts, e.to_string());
                    return;
                }
            };

            if attempts >= max_attempts {
                self.record_failure(&unprocessed, attempts, last_error);
                return;
            }

            let delay = self.config.backoff_ms(attempts - 1);
            warn!(
                "Batch write incomplete ({}), retrying {} items in {}ms (attempt {}/{})",
                last_error,
                unprocessed.len(),
                delay,
                attempts + 1,
                max_attempts
            );
            self.stats.retries += 1;
            tokio::time::sleep(Duration::from_millis(delay)).await;
            pending = unprocessed;
        }
    }

    fn record_failure(&mut self, items: &[ProjectionItem], attempts: u32, error: String) {
        let entity_ids = distinct_entity_ids(items);
        error!(
            "Batch of {} items failed after {} attempt(s): {} (papers: {})",
            items.len(),
            attempts,
            error,
            entity_ids.join(", ")
        );
        self.stats.failed_batches.push(FailedBatch {
            entity_ids,
            items: items.len(),
            attempts,
            error,
        });
    }
}

/// Drop items whose key reappears later in the chunk.
///
/// The surviving item for a key sits at the position of the key's first
/// occurrence and carries the value of its last occurrence.
///
/// # Returns
/// The deduplicated items and the number dropped
pub fn dedupe_last_wins(items: Vec<ProjectionItem>) -> (Vec<ProjectionItem>, usize) {
    let total = items.len();
    let mut positions: HashMap<(String, String), usize> = HashMap::with_capacity(total);
    let mut out: Vec<ProjectionItem> = Vec::with_capacity(total);

    for item in items {
        let key = (item.partition_key.clone(), item.sort_key.clone());
        match positions.get(&key) {
            Some(&index) => out[index] = item,
            None => {
                positions.insert(key, out.len());
                out.push(item);
            }
        }
    }

    let dropped = total - out.len();
    (out, dropped)
}

fn count_kinds(items: &[ProjectionItem]) -> KindCounts {
    let mut counts = KindCounts::default();
    for kind in items.iter().filter_map(ProjectionItem::kind) {
        counts.add(kind, 1);
    }
    counts
}

fn distinct_entity_ids(items: &[ProjectionItem]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for item in items {
        if !ids.contains(&item.payload.arxiv_id) {
            ids.push(item.payload.arxiv_id.clone());
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys;
    use crate::models::PaperPayload;
    use crate::storage::{KeyQuery, StorageError, StorageResult};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    // ===== Mock Store =====

    /// Scripted response for one `put_batch` call.
    #[derive(Clone)]
    enum Script {
        Capacity,
        Fault,
        /// Accept all but the last `n` items
        Unprocessed(usize),
    }

    #[derive(Default)]
    struct MockState {
        batch_sizes: Vec<usize>,
        written: Vec<ProjectionItem>,
        script: VecDeque<Script>,
    }

    #[derive(Clone, Default)]
    struct MockStore {
        state: Arc<Mutex<MockState>>,
    }

    impl MockStore {
        fn new() -> Self {
            Self::default()
        }

        fn then(self, step: Script) -> Self {
            self.state.lock().unwrap().script.push_back(step);
            self
        }

        fn batch_sizes(&self) -> Vec<usize> {
            self.state.lock().unwrap().batch_sizes.clone()
        }

        fn written(&self) -> Vec<ProjectionItem> {
            self.state.lock().unwrap().written.clone()
        }
    }

    #[async_trait]
    impl ProjectionStore for MockStore {
        async fn put_batch(
            &self,
            items: Vec<ProjectionItem>,
            max_batch_size: usize,
        ) -> StorageResult<Vec<ProjectionItem>> {
            let mut state = self.state.lock().unwrap();
            state.batch_sizes.push(items.len());
            assert!(items.len() <= max_batch_size, "batch exceeds ceiling");

            match state.script.pop_front() {
                Some(Script::Capacity) => Err(StorageError::CapacityExceeded("mock capacity".to_string())),
                Some(Script::Fault) => Err(StorageError::Fault("mock fault".to_string())),
                Some(Script::Unprocessed(n)) => {
                    let mut items = items;
                    let split = items.len().saturating_sub(n);
                    let rest = items.split_off(split);
                    state.written.extend(items);
                    Ok(rest)
                }
                None => {
                    state.written.extend(items);
                    Ok(Vec::new())
                }
            }
        }

        async fn query(&self, _query: &KeyQuery) -> StorageResult<Vec<ProjectionItem>> {
            Ok(Vec::new())
        }

        async fn count_items(&self) -> StorageResult<usize> {
            Ok(self.state.lock().unwrap().written.len())
        }
    }

    // ===== Test Helper Functions =====

    fn create_test_item(kind: ProjectionKind, pattern: &str, id: &str, title: &str) -> ProjectionItem {
        let key = keys::encode(kind, pattern, "2023-01-15", id);
        ProjectionItem {
            partition_key: key.partition_key,
            sort_key: key.sort_key,
            secondary: key.secondary,
            payload: PaperPayload {
                arxiv_id: id.to_string(),
                title: title.to_string(),
                authors: vec![],
                abstract_text: String::new(),
                categories: vec![],
                keywords: vec![],
                published: "2023-01-15T00:00:00Z".to_string(),
                published_date: "2023-01-15".to_string(),
            },
        }
    }

    fn distinct_items(n: usize) -> Vec<ProjectionItem> {
        (0..n)
            .map(|i| create_test_item(ProjectionKind::Paper, "", &format!("2301.{:05}", i), "T"))
            .collect()
    }

    fn fast_config() -> IngestionConfig {
        IngestionConfig {
            base_backoff_ms: 1,
            max_backoff_ms: 2,
            ..Default::default()
        }
    }

    // ===== Chunking Tests =====

    #[tokio::test]
    async fn test_fifty_one_items_make_three_calls() {
        let store = MockStore::new();
        let mut writer = BatchWriter::new(store.clone(), fast_config());

        let stats = writer.write_all(distinct_items(51)).await;

        assert_eq!(store.batch_sizes(), vec![25, 25, 1]);
        assert_eq!(stats.store_calls, 3);
        assert_eq!(stats.batches_written, 3);
        assert_eq!(stats.items_written(), 51);
        assert!(stats.failed_batches.is_empty());
    }

    #[tokio::test]
    async fn test_custom_batch_size() {
        let store = MockStore::new();
        let config = IngestionConfig {
            batch_size: 10,
            ..fast_config()
        };
        let mut writer = BatchWriter::new(store.clone(), config);
        writer.write_all(distinct_items(25)).await;
        assert_eq!(store.batch_sizes(), vec![10, 10, 5]);
    }

    #[tokio::test]
    async fn test_empty_input_issues_no_calls() {
        let store = MockStore::new();
        let mut writer = BatchWriter::new(store.clone(), fast_config());
        let stats = writer.write_all(Vec::new()).await;
        assert!(store.batch_sizes().is_empty());
        assert_eq!(stats.store_calls, 0);
    }

    // ===== Deduplication Tests =====

    #[test]
    fn test_dedupe_keeps_last_value() {
        let a1 = create_test_item(ProjectionKind::Paper, "", "a", "first");
        let b = create_test_item(ProjectionKind::Paper, "", "b", "only");
        let a2 = create_test_item(ProjectionKind::Paper, "", "a", "second");

        let (out, dropped) = dedupe_last_wins(vec![a1, b, a2]);
        assert_eq!(dropped, 1);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].payload.arxiv_id, "a");
        assert_eq!(out[0].payload.title, "second");
        assert_eq!(out[1].payload.arxiv_id, "b");
    }

    #[tokio::test]
    async fn test_duplicates_within_chunk_written_once() {
        let store = MockStore::new();
        let mut writer = BatchWriter::new(store.clone(), fast_config());

        let items = vec![
            create_test_item(ProjectionKind::Author, "Alice", "a", "old"),
            create_test_item(ProjectionKind::Author, "Alice", "a", "new"),
        ];
        let stats = writer.write_all(items).await;

        assert_eq!(store.batch_sizes(), vec![1]);
        assert_eq!(stats.duplicates_dropped, 1);
        assert_eq!(store.written()[0].payload.title, "new");
        assert_eq!(stats.written.author, 1);
    }

    // ===== Retry Tests =====

    #[tokio::test]
    async fn test_capacity_error_retried() {
        let store = MockStore::new().then(Script::Capacity).then(Script::Capacity);
        let mut writer = BatchWriter::new(store.clone(), fast_config());

        let stats = writer.write_all(distinct_items(3)).await;

        assert_eq!(store.batch_sizes(), vec![3, 3, 3]);
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.items_written(), 3);
        assert!(stats.failed_batches.is_empty());
    }

    #[tokio::test]
    async fn test_only_unprocessed_items_retried() {
        let store = MockStore::new().then(Script::Unprocessed(2));
        let mut writer = BatchWriter::new(store.clone(), fast_config());

        let stats = writer.write_all(distinct_items(5)).await;

        assert_eq!(store.batch_sizes(), vec![5, 2]);
        assert_eq!(stats.items_written(), 5);
        assert_eq!(stats.batches_written, 1);
        assert_eq!(store.written().len(), 5);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_chunk_and_continue() {
        let config = IngestionConfig {
            batch_size: 2,
            max_attempts: 2,
            ..fast_config()
        };
        let store = MockStore::new().then(Script::Capacity).then(Script::Capacity);
        let mut writer = BatchWriter::new(store.clone(), config);

        let stats = writer.write_all(distinct_items(4)).await;

        // Two failed attempts on the first chunk, then the second chunk succeeds
        assert_eq!(store.batch_sizes(), vec![2, 2, 2]);
        assert_eq!(stats.failed_batches.len(), 1);
        let failed = &stats.failed_batches[0];
        assert_eq!(failed.entity_ids, vec!["2301.00000", "2301.00001"]);
        assert_eq!(failed.attempts, 2);
        assert_eq!(stats.items_written(), 2);
        assert_eq!(stats.batches_written, 1);
    }

    #[tokio::test]
    async fn test_fault_not_retried() {
        let store = MockStore::new().then(Script::Fault);
        let mut writer = BatchWriter::new(store.clone(), fast_config());

        let stats = writer.write_all(distinct_items(2)).await;

        assert_eq!(store.batch_sizes(), vec![2]);
        assert_eq!(stats.retries, 0);
        assert_eq!(stats.failed_batches.len(), 1);
        assert!(stats.failed_batches[0].error.contains("mock fault"));
    }

    #[tokio::test]
    async fn test_finish_resets_counters() {
        let store = MockStore::new();
        let mut writer = BatchWriter::new(store, fast_config());
        writer.push(create_test_item(ProjectionKind::Paper, "", "a", "T")).await;
        assert_eq!(writer.pending(), 1);

        let first = writer.finish().await;
        assert_eq!(first.items_written(), 1);
        assert_eq!(writer.pending(), 0);
        assert_eq!(writer.stats().store_calls, 0);
    }
}

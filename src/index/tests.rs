use super::*;
use crate::test_support::{FailingIndex, MemoryIndex, StubEmbedder, item};
use async_trait::async_trait;

const DIM: usize = 8;

fn fast_config() -> IndexingConfig {
    IndexingConfig {
        rebuild_interval_mins: 60,
        batch_size: 2,
        item_delay_ms: 0,
        batch_delay_ms: 0,
        delete_chunk_size: 100,
    }
}

fn indexer(index: Arc<dyn VectorIndex>, force: bool) -> Indexer {
    Indexer::new(
        index,
        Arc::new(StubEmbedder::new(DIM)),
        fast_config(),
        Duration::from_secs(3600),
        force,
    )
}

#[test]
fn stats_id_appends_suffix() {
    assert_eq!(stats_id("vid-1"), "vid-1_stats");
}

#[test]
fn general_payload_omits_raw_counters() {
    let item = item("vid-1", "Live Concert", 5_000_000);
    let payload = general_payload(&item);

    assert!(payload.contains("Title: Live Concert"));
    assert!(payload.contains("Publish year: 2023"));
    assert!(payload.contains("regular video"));
    assert!(!payload.contains("5000000"));
    assert!(!payload.contains("Views"));
}

#[test]
fn statistical_payload_uses_coarse_buckets() {
    let item = item("vid-1", "Live Concert", 5_000_000);
    let payload = statistical_payload(&item);

    assert!(payload.contains("Views (thousands): 5000"));
    assert!(payload.contains("Likes (thousands): 100"));
    assert!(payload.contains("Comments (hundreds): 100"));
    assert!(!payload.contains("5000000"));
}

#[test]
fn metadata_truncates_description_and_marks_stats() {
    let mut long = item("vid-1", "Long", 100);
    long.description = "x".repeat(800);

    let general = entry_metadata(&long, "general");
    let description = general["description"].as_str().unwrap();
    assert_eq!(description.chars().count(), 500);
    assert_eq!(general["searchType"], "general");
    assert_eq!(general["type"], "video");
    assert!(general.get("originalId").is_none());

    let stats = entry_metadata(&long, "statistical");
    assert_eq!(stats["originalId"], "vid-1");
    assert_eq!(stats["searchType"], "statistical");
}

#[tokio::test]
async fn rebuild_writes_two_entries_per_item_plus_sentinel() {
    let index = Arc::new(MemoryIndex::new());
    let catalog = vec![
        item("vid-1", "Concert", 5_000_000),
        item("vid-2", "Cover Song", 200_000),
        item("vid-3", "Chat Stream", 80_000),
    ];

    let started_at = Utc::now();
    let outcome = indexer(Arc::clone(&index) as Arc<dyn VectorIndex>, false)
        .rebuild(&catalog)
        .await
        .expect("rebuild succeeds");

    assert!(!outcome.skipped);
    assert_eq!(outcome.items_indexed, 3);
    assert_eq!(outcome.items_failed, 0);
    assert_eq!(outcome.entries_upserted, 6);

    // 2n item entries plus the sentinel
    assert_eq!(index.len(), 7);
    assert!(index.contains("vid-1"));
    assert!(index.contains("vid-1_stats"));
    assert!(index.contains(SENTINEL_ID));

    let sentinel = index.metadata_of(SENTINEL_ID).expect("sentinel exists");
    assert_eq!(sentinel["type"], "timestamp");
    let stamped = DateTime::parse_from_rfc3339(sentinel["timestamp"].as_str().unwrap())
        .expect("sentinel timestamp is RFC 3339")
        .with_timezone(&Utc);
    assert!(stamped >= started_at);
}

#[tokio::test]
async fn metadata_counters_survive_round_trip() {
    let index = Arc::new(MemoryIndex::new());
    let catalog = vec![item("vid-1", "Concert", 5_000_000)];

    indexer(Arc::clone(&index) as Arc<dyn VectorIndex>, false)
        .rebuild(&catalog)
        .await
        .expect("rebuild succeeds");

    let fetched = index
        .fetch(&["vid-1".to_string()])
        .await
        .expect("fetch succeeds");
    let metadata = fetched[0].metadata.as_ref().expect("metadata present");

    assert_eq!(metadata["viewCount"], 5_000_000);
    assert_eq!(metadata["likeCount"], 100_000);
    assert_eq!(metadata["commentCount"], 10_000);
    assert_eq!(metadata["publishYear"], 2023);
}

#[tokio::test]
async fn rebuild_skips_when_index_is_fresh() {
    let index = Arc::new(MemoryIndex::new());
    let catalog = vec![item("vid-1", "Concert", 1000)];

    indexer(Arc::clone(&index) as Arc<dyn VectorIndex>, false)
        .rebuild(&catalog)
        .await
        .expect("first rebuild succeeds");
    let count_after_first = index.len();

    let outcome = indexer(Arc::clone(&index) as Arc<dyn VectorIndex>, false)
        .rebuild(&catalog)
        .await
        .expect("second invocation succeeds");

    assert!(outcome.skipped);
    assert_eq!(outcome.entries_upserted, 0);
    assert_eq!(index.len(), count_after_first);
}

#[tokio::test]
async fn force_flag_overrides_freshness() {
    let index = Arc::new(MemoryIndex::new());
    let catalog = vec![item("vid-1", "Concert", 1000)];

    indexer(Arc::clone(&index) as Arc<dyn VectorIndex>, false)
        .rebuild(&catalog)
        .await
        .expect("first rebuild succeeds");

    let outcome = indexer(Arc::clone(&index) as Arc<dyn VectorIndex>, true)
        .rebuild(&catalog)
        .await
        .expect("forced rebuild succeeds");

    assert!(!outcome.skipped);
    assert_eq!(outcome.items_indexed, 1);
}

struct FlakyEmbedder {
    inner: StubEmbedder,
    fail_marker: &'static str,
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, crate::embeddings::EmbeddingError> {
        if text.contains(self.fail_marker) {
            return Err(crate::embeddings::EmbeddingError::Unreachable(
                "stub outage".to_string(),
            ));
        }
        self.inner.embed(text).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

#[tokio::test]
async fn failed_item_is_skipped_not_fatal() {
    let index = Arc::new(MemoryIndex::new());
    let embedder = Arc::new(FlakyEmbedder {
        inner: StubEmbedder::new(DIM),
        fail_marker: "Broken",
    });
    let catalog = vec![item("vid-1", "Fine", 1000), item("vid-2", "Broken", 1000)];

    let outcome = Indexer::new(
        Arc::clone(&index) as Arc<dyn VectorIndex>,
        embedder,
        fast_config(),
        Duration::from_secs(3600),
        false,
    )
    .rebuild(&catalog)
    .await
    .expect("rebuild tolerates item failures");

    assert_eq!(outcome.items_indexed, 1);
    assert_eq!(outcome.items_failed, 1);
    assert!(index.contains("vid-1"));
    assert!(!index.contains("vid-2"));
    assert!(!index.contains("vid-2_stats"));
    assert!(index.contains(SENTINEL_ID));
}

struct UpsertFailingIndex {
    inner: MemoryIndex,
}

#[async_trait]
impl VectorIndex for UpsertFailingIndex {
    async fn upsert(
        &self,
        _records: Vec<crate::store::VectorRecord>,
    ) -> Result<(), crate::store::StoreError> {
        Err(crate::store::StoreError::Unavailable("stub outage".to_string()))
    }

    async fn query(
        &self,
        request: crate::store::QueryRequest,
    ) -> Result<Vec<crate::store::QueryMatch>, crate::store::StoreError> {
        self.inner.query(request).await
    }

    async fn fetch(
        &self,
        ids: &[String],
    ) -> Result<Vec<crate::store::FetchedRecord>, crate::store::StoreError> {
        self.inner.fetch(ids).await
    }

    async fn delete(&self, ids: &[String]) -> Result<u64, crate::store::StoreError> {
        self.inner.delete(ids).await
    }

    async fn info(&self) -> Result<crate::store::IndexInfo, crate::store::StoreError> {
        self.inner.info().await
    }

    async fn reset(&self) -> Result<(), crate::store::StoreError> {
        self.inner.reset().await
    }
}

#[tokio::test]
async fn failed_upsert_leaves_sentinel_untouched() {
    let index = Arc::new(UpsertFailingIndex {
        inner: MemoryIndex::new(),
    });
    let catalog = vec![item("vid-1", "Concert", 1000)];

    let result = indexer(Arc::clone(&index) as Arc<dyn VectorIndex>, false)
        .rebuild(&catalog)
        .await;

    assert!(result.is_err());
    assert!(!index.inner.contains(SENTINEL_ID));
}

#[tokio::test]
async fn unavailable_store_fails_rebuild() {
    let catalog = vec![item("vid-1", "Concert", 1000)];

    let result = indexer(Arc::new(FailingIndex), false).rebuild(&catalog).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn status_reports_counts_and_freshness() {
    let index = Arc::new(MemoryIndex::new());
    let catalog = vec![
        item("vid-1", "Concert", 1000),
        item("vid-2", "Cover", 2000),
        item("vid-3", "Stream", 3000),
    ];

    let indexer = indexer(Arc::clone(&index) as Arc<dyn VectorIndex>, false);

    let before = indexer.status().await;
    assert!(before.should_update);
    assert!(before.last_update.is_none());
    assert_eq!(before.total_vectors, 0);
    assert_eq!(before.estimated_items, 0);

    indexer.rebuild(&catalog).await.expect("rebuild succeeds");

    let after = indexer.status().await;
    assert!(!after.should_update);
    assert!(after.last_update.is_some());
    assert_eq!(after.total_vectors, 7);
    assert_eq!(after.estimated_items, 3);
}

#[tokio::test]
async fn status_degrades_when_store_is_down() {
    let status = indexer(Arc::new(FailingIndex), false).status().await;

    assert!(status.should_update);
    assert!(status.last_update.is_none());
    assert_eq!(status.total_vectors, 0);
}

// Index build pipeline: staleness-gated full rebuilds of the vector index,
// producing two entries per catalog item (general + statistical).

#[cfg(test)]
mod tests;

use chrono::{DateTime, Datelike, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::catalog::{CatalogItem, format_duration};
use crate::config::IndexingConfig;
use crate::embeddings::Embedder;
use crate::store::{StoreError, VectorIndex, VectorRecord};
use crate::{Result, VidsearchError};

/// Reserved ID of the sentinel record holding the last-rebuild timestamp.
/// Stored inside the index itself so no extra state store is needed.
pub const SENTINEL_ID: &str = "__last_update_timestamp__";

/// Suffix appended to an item's ID to form its statistical entry ID.
pub const STATS_SUFFIX: &str = "_stats";

const DESCRIPTION_MAX_CHARS: usize = 500;

/// Statistical entry ID for a catalog item.
#[inline]
pub fn stats_id(item_id: &str) -> String {
    format!("{}{}", item_id, STATS_SUFFIX)
}

/// Build the text payload for the general (topical search) entry. Exact
/// engagement counters are deliberately left out so the semantic space is not
/// dominated by number tokens.
#[inline]
pub fn general_payload(item: &CatalogItem) -> String {
    format!(
        "Title: {}\n\
         Description: {}\n\
         Published: {}\n\
         Publish year: {}\n\
         Publish month: {}\n\
         Duration: {}\n\
         Content type: {}",
        item.title,
        item.description,
        item.published_at.format("%Y-%m-%d"),
        item.published_at.year(),
        item.published_at.month(),
        format_duration(&item.duration),
        item.content_type_label(),
    )
}

/// Build the text payload for the statistical entry: the general payload plus
/// coarsened numeric buckets as text tokens.
#[inline]
pub fn statistical_payload(item: &CatalogItem) -> String {
    format!(
        "{}\n\
         Views (thousands): {}\n\
         Likes (thousands): {}\n\
         Comments (hundreds): {}",
        general_payload(item),
        item.view_count / 1000,
        item.like_count / 1000,
        item.comment_count / 100,
    )
}

/// Metadata stored on both entries for an item; must stay numerically
/// consistent with the source catalog item at build time.
fn entry_metadata(item: &CatalogItem, search_type: &str) -> serde_json::Value {
    let description: String = item.description.chars().take(DESCRIPTION_MAX_CHARS).collect();

    let mut metadata = json!({
        "title": item.title,
        "description": description,
        "publishedAt": item.published_at.to_rfc3339(),
        "viewCount": item.view_count,
        "likeCount": item.like_count,
        "commentCount": item.comment_count,
        "duration": item.duration,
        "durationSeconds": item.duration_seconds(),
        "isLiveContent": item.is_live_content,
        "isShort": item.is_short,
        "publishYear": item.published_at.year(),
        "publishMonth": item.published_at.month(),
        "type": "video",
        "searchType": search_type,
    });

    if search_type == "statistical" {
        metadata["originalId"] = json!(item.id);
    }

    metadata
}

/// Decides whether a rebuild is due based on the sentinel record.
pub struct StalenessTracker {
    index: Arc<dyn VectorIndex>,
    interval: Duration,
    force: bool,
    dimension: usize,
}

impl StalenessTracker {
    #[inline]
    pub fn new(index: Arc<dyn VectorIndex>, interval: Duration, force: bool, dimension: usize) -> Self {
        Self {
            index,
            interval,
            force,
            dimension,
        }
    }

    /// Timestamp of the last successful rebuild, if the sentinel exists and
    /// is readable.
    #[inline]
    pub async fn last_update(&self) -> Option<DateTime<Utc>> {
        let records = match self.index.fetch(&[SENTINEL_ID.to_string()]).await {
            Ok(records) => records,
            Err(e) => {
                debug!("Sentinel fetch failed (possibly first run): {}", e);
                return None;
            }
        };

        let metadata = records.into_iter().next()?.metadata?;
        let timestamp = metadata.get("timestamp")?.as_str()?;
        DateTime::parse_from_rfc3339(timestamp)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Whether a rebuild is due. Fails open: an unreadable or absent sentinel
    /// means "rebuild needed", never a silent skip.
    #[inline]
    pub async fn should_rebuild(&self) -> bool {
        if self.force {
            info!("Force-rebuild flag is set, rebuilding");
            return true;
        }

        let Some(last_update) = self.last_update().await else {
            info!("No rebuild sentinel found, rebuilding (first run)");
            return true;
        };

        let elapsed = Utc::now().signed_duration_since(last_update);
        let due = elapsed.num_seconds() >= self.interval.as_secs() as i64;

        debug!(
            "Staleness check: last update {}, elapsed {}s, rebuild due: {}",
            last_update.to_rfc3339(),
            elapsed.num_seconds(),
            due
        );

        due
    }

    /// Overwrite the sentinel with the current time. Must only be called
    /// after a rebuild fully completes; a partial rebuild leaves the sentinel
    /// untouched so the next invocation retries from scratch.
    #[inline]
    pub async fn mark_rebuilt(&self) -> Result<(), StoreError> {
        let now = Utc::now();

        // The sentinel is only ever fetched by exact ID, never by similarity,
        // so a neutral zero-filled vector of the index dimensionality is fine.
        let record = VectorRecord {
            id: SENTINEL_ID.to_string(),
            vector: vec![0.0; self.dimension],
            metadata: json!({
                "timestamp": now.to_rfc3339(),
                "type": "timestamp",
            }),
        };

        self.index.upsert(vec![record]).await?;
        info!("Rebuild sentinel updated: {}", now.to_rfc3339());
        Ok(())
    }
}

/// Outcome of one rebuild invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RebuildOutcome {
    /// True when the staleness gate decided no rebuild was due.
    pub skipped: bool,
    pub items_indexed: usize,
    pub items_failed: usize,
    pub entries_upserted: usize,
}

/// Snapshot of the index's health for the admin status operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStatus {
    pub last_update: Option<DateTime<Utc>>,
    pub should_update: bool,
    pub total_vectors: u64,
    /// Item estimate: entries excluding the sentinel, two per item.
    pub estimated_items: u64,
}

/// Orchestrates full-catalog rebuilds: delete stale entries, batch, embed
/// twice per item, upsert, update the sentinel.
pub struct Indexer {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    tracker: StalenessTracker,
    config: IndexingConfig,
}

impl Indexer {
    #[inline]
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        config: IndexingConfig,
        interval: Duration,
        force: bool,
    ) -> Self {
        let dimension = embedder.dimension();
        let tracker = StalenessTracker::new(Arc::clone(&index), interval, force, dimension);

        Self {
            index,
            embedder,
            tracker,
            config,
        }
    }

    /// Rebuild the index from a catalog snapshot. Idempotent per interval:
    /// returns a skipped outcome when the staleness gate says no rebuild is
    /// due. Per-item embedding failures are logged and skipped; an upsert
    /// failure is fatal to the whole rebuild and leaves the sentinel
    /// untouched.
    #[inline]
    pub async fn rebuild(&self, catalog: &[CatalogItem]) -> Result<RebuildOutcome> {
        if !self.tracker.should_rebuild().await {
            info!("Index is fresh, skipping rebuild");
            return Ok(RebuildOutcome {
                skipped: true,
                ..RebuildOutcome::default()
            });
        }

        info!("Starting index rebuild for {} items", catalog.len());

        self.delete_existing_entries(catalog).await;

        let mut outcome = RebuildOutcome::default();
        let batch_count = catalog.len().div_ceil(self.config.batch_size.max(1));

        for (batch_index, batch) in catalog.chunks(self.config.batch_size.max(1)).enumerate() {
            debug!("Processing batch {}/{}", batch_index + 1, batch_count);

            let mut records = Vec::with_capacity(batch.len() * 2);

            for item in batch {
                match self.embed_item(item).await {
                    Ok((general, statistical)) => {
                        records.push(general);
                        records.push(statistical);
                        outcome.items_indexed += 1;
                    }
                    Err(e) => {
                        // A failed item must not abort the batch or rebuild.
                        error!("Failed to embed item {}: {}", item.id, e);
                        outcome.items_failed += 1;
                    }
                }

                sleep(Duration::from_millis(self.config.item_delay_ms)).await;
            }

            if !records.is_empty() {
                let count = records.len();
                self.index
                    .upsert(records)
                    .await
                    .map_err(|e| VidsearchError::Store(format!("batch upsert failed: {}", e)))?;
                outcome.entries_upserted += count;
                debug!("Batch {}/{} upserted {} entries", batch_index + 1, batch_count, count);
            }

            sleep(Duration::from_millis(self.config.batch_delay_ms)).await;
        }

        self.tracker
            .mark_rebuilt()
            .await
            .map_err(|e| VidsearchError::Store(format!("failed to update sentinel: {}", e)))?;

        info!(
            "Rebuild complete: {} items indexed, {} failed, {} entries upserted",
            outcome.items_indexed, outcome.items_failed, outcome.entries_upserted
        );

        Ok(outcome)
    }

    /// Best-effort delete of every possible entry ID for the snapshot, in
    /// bounded batches. "Not found" is success; the first run has nothing to
    /// delete.
    async fn delete_existing_entries(&self, catalog: &[CatalogItem]) {
        let ids: Vec<String> = catalog
            .iter()
            .flat_map(|item| [item.id.clone(), stats_id(&item.id)])
            .collect();

        for chunk in ids.chunks(self.config.delete_chunk_size.max(1)) {
            match self.index.delete(chunk).await {
                Ok(deleted) => debug!("Deleted {} stale entries", deleted),
                Err(e) => warn!("Stale entry deletion failed (possibly first run): {}", e),
            }
        }
    }

    async fn embed_item(&self, item: &CatalogItem) -> Result<(VectorRecord, VectorRecord), VidsearchError> {
        let general_vector = self
            .embedder
            .embed(&general_payload(item))
            .await
            .map_err(|e| VidsearchError::Embedding(e.to_string()))?;

        let statistical_vector = self
            .embedder
            .embed(&statistical_payload(item))
            .await
            .map_err(|e| VidsearchError::Embedding(e.to_string()))?;

        let general = VectorRecord {
            id: item.id.clone(),
            vector: general_vector,
            metadata: entry_metadata(item, "general"),
        };

        let statistical = VectorRecord {
            id: stats_id(&item.id),
            vector: statistical_vector,
            metadata: entry_metadata(item, "statistical"),
        };

        Ok((general, statistical))
    }

    /// Report index status for the admin surface. Store errors degrade to
    /// "never updated, rebuild needed" rather than failing the call.
    #[inline]
    pub async fn status(&self) -> IndexStatus {
        let last_update = self.tracker.last_update().await;
        let should_update = self.tracker.should_rebuild().await;

        let total_vectors = match self.index.info().await {
            Ok(info) => info.vector_count,
            Err(e) => {
                warn!("Failed to fetch index info: {}", e);
                0
            }
        };

        IndexStatus {
            last_update,
            should_update,
            total_vectors,
            estimated_items: total_vectors.saturating_sub(1) / 2,
        }
    }

}

// Two-tier retrieval: embedding similarity against a filtered partition of
// the vector index, with an in-memory keyword fallback over the catalog.


use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::catalog::CatalogItem;
use crate::config::RetrievalConfig;
use crate::embeddings::Embedder;
use crate::index::STATS_SUFFIX;
use crate::query::{QueryIntent, extract_year};
use crate::store::{QueryMatch, QueryRequest, VectorIndex, general_filter, statistical_filter};

/// Terms appended to statistical queries so they land near the statistical
/// entries, which carry the same vocabulary in their payloads.
const STATISTICAL_BOOST: &str = "view count popularity ranking 再生回数 人気 ランキング";

/// Retrieval failure distinct from an empty result: the caller should fall
/// back to keyword search, not report "no matches".
#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("Retrieval unavailable: {0}")]
    Unavailable(String),
}

/// Read-only retrieval over the vector index.
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    config: RetrievalConfig,
}

impl Retriever {
    #[inline]
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            config,
        }
    }

    /// Retrieve catalog items for a classified query. An `Ok(vec![])` means
    /// the index genuinely had no matches above threshold; infrastructure
    /// failures surface as `Unavailable`.
    #[inline]
    pub async fn retrieve(
        &self,
        query: &str,
        intent: QueryIntent,
    ) -> Result<Vec<CatalogItem>, RetrieveError> {
        match intent {
            QueryIntent::Statistical => self.retrieve_statistical(query).await,
            _ => self.retrieve_general(query, intent).await,
        }
    }

    async fn retrieve_statistical(&self, query: &str) -> Result<Vec<CatalogItem>, RetrieveError> {
        let year = extract_year(query);
        let augmented = format!("{} {}", query, STATISTICAL_BOOST);
        let vector = self.embed(&augmented).await?;

        let matches = self
            .index
            .query(QueryRequest {
                vector,
                top_k: self.config.statistical_top_k,
                filter: Some(statistical_filter(year)),
                include_metadata: true,
            })
            .await
            .map_err(|e| RetrieveError::Unavailable(e.to_string()))?;

        debug!(
            "Statistical retrieval: {} raw matches (year filter: {:?})",
            matches.len(),
            year
        );

        let items = matches
            .into_iter()
            .filter(|m| m.score >= self.config.statistical_score_threshold)
            // One result per source item, keeping the best-scoring entry.
            .unique_by(|m| original_id(m))
            .filter_map(|m| item_from_match(&m))
            .collect();

        Ok(items)
    }

    async fn retrieve_general(
        &self,
        query: &str,
        intent: QueryIntent,
    ) -> Result<Vec<CatalogItem>, RetrieveError> {
        let vector = self.embed(query).await?;

        let matches = self
            .index
            .query(QueryRequest {
                vector,
                top_k: self.config.general_top_k,
                filter: Some(general_filter()),
                include_metadata: true,
            })
            .await
            .map_err(|e| RetrieveError::Unavailable(e.to_string()))?;

        debug!("General retrieval: {} raw matches", matches.len());

        let mut items: Vec<CatalogItem> = matches
            .into_iter()
            .filter(|m| m.score >= self.config.general_score_threshold)
            .filter_map(|m| item_from_match(&m))
            .collect();

        if intent == QueryIntent::Recent {
            items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        }

        Ok(items)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrieveError> {
        self.embedder
            .embed(text)
            .await
            .map_err(|e| RetrieveError::Unavailable(e.to_string()))
    }
}

/// Source item ID for a match: the `originalId` metadata field when present,
/// otherwise the entry ID with any statistical suffix stripped.
fn original_id(m: &QueryMatch) -> String {
    m.metadata
        .as_ref()
        .and_then(|md| md.get("originalId"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| m.id.trim_end_matches(STATS_SUFFIX).to_string())
}

/// Rebuild a catalog item from entry metadata. Tolerates partial metadata
/// from older index generations: missing numerics read as zero, missing
/// flags as false, an unparseable date as the epoch.
fn item_from_match(m: &QueryMatch) -> Option<CatalogItem> {
    let Some(metadata) = m.metadata.as_ref() else {
        warn!("Match {} has no metadata, dropping", m.id);
        return None;
    };

    let text = |key: &str| -> String {
        metadata
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };
    let number = |key: &str| -> u64 { metadata.get(key).and_then(|v| v.as_u64()).unwrap_or(0) };
    let flag = |key: &str| -> bool {
        metadata
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    };

    let published_at = metadata
        .get("publishedAt")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map_or_else(|| DateTime::<Utc>::UNIX_EPOCH, |dt| dt.with_timezone(&Utc));

    Some(CatalogItem {
        id: original_id(m),
        title: text("title"),
        description: text("description"),
        published_at,
        duration: text("duration"),
        view_count: number("viewCount"),
        like_count: number("likeCount"),
        comment_count: number("commentCount"),
        is_live_content: flag("isLiveContent"),
        is_short: flag("isShort"),
    })
}

/// Keyword fallback over the in-memory catalog, for when the vector pipeline
/// is unavailable or returns nothing. Three stages: whole-query substring
/// match, per-token broadening, then padding with the most-viewed items so
/// the caller always gets at least `min_results` (catalog permitting).
#[inline]
pub fn fallback_search(
    catalog: &[CatalogItem],
    query: &str,
    limit: usize,
    min_results: usize,
) -> Vec<CatalogItem> {
    let needle = query.trim().to_lowercase();

    let mut results: Vec<CatalogItem> = catalog
        .iter()
        .filter(|item| {
            !needle.is_empty()
                && (item.title.to_lowercase().contains(&needle)
                    || item.description.to_lowercase().contains(&needle))
        })
        .cloned()
        .collect();

    if results.len() < min_results {
        let tokens: Vec<String> = needle
            .split_whitespace()
            .filter(|t| t.len() > 1)
            .map(str::to_string)
            .collect();

        if !tokens.is_empty() {
            for item in catalog {
                if results.iter().any(|r| r.id == item.id) {
                    continue;
                }
                let haystack =
                    format!("{} {}", item.title.to_lowercase(), item.description.to_lowercase());
                if tokens.iter().any(|t| haystack.contains(t)) {
                    results.push(item.clone());
                }
            }
        }
    }

    if results.len() < min_results {
        let mut by_views: Vec<&CatalogItem> = catalog.iter().collect();
        by_views.sort_by(|a, b| b.view_count.cmp(&a.view_count));

        for item in by_views {
            if results.len() >= min_results {
                break;
            }
            if !results.iter().any(|r| r.id == item.id) {
                results.push(item.clone());
            }
        }
    }

    results.truncate(limit);
    results
}

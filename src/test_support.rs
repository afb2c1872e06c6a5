//! Shared test doubles: an in-memory vector index with cosine similarity and
//! a tiny filter evaluator, plus a deterministic stub embedder.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::catalog::CatalogItem;
use crate::embeddings::{Embedder, EmbeddingError};
use crate::store::{
    FetchedRecord, IndexInfo, QueryMatch, QueryRequest, StoreError, VectorIndex, VectorRecord,
};

/// Catalog item fixture with sensible defaults.
pub(crate) fn item(id: &str, title: &str, views: u64) -> CatalogItem {
    CatalogItem {
        id: id.to_string(),
        title: title.to_string(),
        description: format!("Description of {}", title),
        published_at: Utc
            .with_ymd_and_hms(2023, 6, 15, 12, 0, 0)
            .single()
            .expect("valid fixture timestamp"),
        duration: "PT4M13S".to_string(),
        view_count: views,
        like_count: views / 50,
        comment_count: views / 500,
        is_live_content: false,
        is_short: false,
    }
}

/// Deterministic embedder: normalized character-bag vectors, so texts sharing
/// characters score high under cosine similarity. Never fails.
pub(crate) struct StubEmbedder {
    pub dimension: usize,
}

impl StubEmbedder {
    pub(crate) fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0_f32; self.dimension];
        for ch in text.chars() {
            vector[(ch as usize) % self.dimension] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Embedder double that always fails as unreachable.
pub(crate) struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Unreachable("stub outage".to_string()))
    }

    fn dimension(&self) -> usize {
        8
    }
}

/// In-memory stand-in for the external vector index. Supports the filter
/// grammar the crate actually emits: `key = value` clauses joined by AND,
/// with single-quoted strings or bare integers on the right.
#[derive(Default)]
pub(crate) struct MemoryIndex {
    records: Mutex<HashMap<String, (Vec<f32>, serde_json::Value)>>,
}

impl MemoryIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.lock().expect("index lock poisoned").len()
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.records
            .lock()
            .expect("index lock poisoned")
            .contains_key(id)
    }

    pub(crate) fn metadata_of(&self, id: &str) -> Option<serde_json::Value> {
        self.records
            .lock()
            .expect("index lock poisoned")
            .get(id)
            .map(|(_, metadata)| metadata.clone())
    }

    fn matches_filter(metadata: &serde_json::Value, filter: &str) -> bool {
        filter.split(" AND ").all(|clause| {
            let Some((key, value)) = clause.split_once(" = ") else {
                return false;
            };
            let Some(actual) = metadata.get(key.trim()) else {
                return false;
            };

            let value = value.trim();
            if let Some(text) = value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')) {
                actual.as_str() == Some(text)
            } else {
                value
                    .parse::<i64>()
                    .is_ok_and(|number| actual.as_i64() == Some(number))
            }
        })
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("index lock poisoned");
        for record in records {
            guard.insert(record.id, (record.vector, record.metadata));
        }
        Ok(())
    }

    async fn query(&self, request: QueryRequest) -> Result<Vec<QueryMatch>, StoreError> {
        let guard = self.records.lock().expect("index lock poisoned");

        let mut matches: Vec<QueryMatch> = guard
            .iter()
            .filter(|(_, (_, metadata))| {
                request
                    .filter
                    .as_deref()
                    .is_none_or(|filter| Self::matches_filter(metadata, filter))
            })
            .map(|(id, (vector, metadata))| QueryMatch {
                id: id.clone(),
                score: cosine(&request.vector, vector),
                metadata: request.include_metadata.then(|| metadata.clone()),
            })
            .collect();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(request.top_k);
        Ok(matches)
    }

    async fn fetch(&self, ids: &[String]) -> Result<Vec<FetchedRecord>, StoreError> {
        let guard = self.records.lock().expect("index lock poisoned");
        Ok(ids
            .iter()
            .filter_map(|id| {
                guard.get(id).map(|(_, metadata)| FetchedRecord {
                    id: id.clone(),
                    metadata: Some(metadata.clone()),
                })
            })
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<u64, StoreError> {
        let mut guard = self.records.lock().expect("index lock poisoned");
        let mut deleted = 0;
        for id in ids {
            if guard.remove(id).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn info(&self) -> Result<IndexInfo, StoreError> {
        Ok(IndexInfo {
            vector_count: self.len() as u64,
        })
    }

    async fn reset(&self) -> Result<(), StoreError> {
        self.records.lock().expect("index lock poisoned").clear();
        Ok(())
    }
}

/// Vector index double that always fails as unavailable.
pub(crate) struct FailingIndex;

#[async_trait]
impl VectorIndex for FailingIndex {
    async fn upsert(&self, _records: Vec<VectorRecord>) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("stub outage".to_string()))
    }

    async fn query(&self, _request: QueryRequest) -> Result<Vec<QueryMatch>, StoreError> {
        Err(StoreError::Unavailable("stub outage".to_string()))
    }

    async fn fetch(&self, _ids: &[String]) -> Result<Vec<FetchedRecord>, StoreError> {
        Err(StoreError::Unavailable("stub outage".to_string()))
    }

    async fn delete(&self, _ids: &[String]) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("stub outage".to_string()))
    }

    async fn info(&self) -> Result<IndexInfo, StoreError> {
        Err(StoreError::Unavailable("stub outage".to_string()))
    }

    async fn reset(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("stub outage".to_string()))
    }
}

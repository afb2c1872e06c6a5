// Vector store boundary: upsert/query/fetch/delete/info/reset against an
// external index keyed by string IDs with attached JSON metadata.

pub mod upstash;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use upstash::UpstashClient;

/// A vector plus its metadata, as stored in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: serde_json::Value,
}

/// A similarity query against one metadata-filtered partition of the index.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub vector: Vec<f32>,
    pub top_k: usize,
    pub filter: Option<String>,
    pub include_metadata: bool,
}

/// A single similarity match.
#[derive(Debug, Clone)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    pub metadata: Option<serde_json::Value>,
}

/// A record fetched by exact ID.
#[derive(Debug, Clone)]
pub struct FetchedRecord {
    pub id: String,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexInfo {
    pub vector_count: u64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Vector store unavailable: {0}")]
    Unavailable(String),
    #[error("Vector store rejected request: {0}")]
    Rejected(String),
    #[error("Vector store returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Operations against the external vector index. The indexer is the only
/// writer; retrieval and validation are read-only.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), StoreError>;

    async fn query(&self, request: QueryRequest) -> Result<Vec<QueryMatch>, StoreError>;

    async fn fetch(&self, ids: &[String]) -> Result<Vec<FetchedRecord>, StoreError>;

    async fn delete(&self, ids: &[String]) -> Result<u64, StoreError>;

    async fn info(&self) -> Result<IndexInfo, StoreError>;

    /// Destructive: removes every record in the index.
    async fn reset(&self) -> Result<(), StoreError>;
}

/// Filter predicate for the general (topical search) partition.
#[inline]
pub fn general_filter() -> String {
    "type = 'video' AND searchType = 'general'".to_string()
}

/// Filter predicate for the statistical partition, optionally narrowed to a
/// publication year extracted from the query.
#[inline]
pub fn statistical_filter(year: Option<i32>) -> String {
    match year {
        Some(year) => format!(
            "type = 'video' AND searchType = 'statistical' AND publishYear = {}",
            year
        ),
        None => "type = 'video' AND searchType = 'statistical'".to_string(),
    }
}

// Admin-surface health checks and destructive cleanup for the vector index.


use chrono::DateTime;
use std::sync::Arc;
use tracing::{info, warn};

use crate::index::SENTINEL_ID;
use crate::store::{QueryRequest, StoreError, VectorIndex};

const SAMPLE_SIZE: usize = 5;

/// Outcome of an index health check. `is_valid` is false whenever any issue
/// was found; recommendations are advisory and do not fail validation.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Read-only validation plus destructive cleanup.
pub struct IndexValidator {
    index: Arc<dyn VectorIndex>,
    dimension: usize,
}

impl IndexValidator {
    #[inline]
    pub fn new(index: Arc<dyn VectorIndex>, dimension: usize) -> Self {
        Self { index, dimension }
    }

    /// Check reachability, the rebuild sentinel, and a small sample of
    /// entries for metadata shape. Never mutates the index.
    #[inline]
    pub async fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        let info = match self.index.info().await {
            Ok(info) => info,
            Err(e) => {
                report.issues.push(format!("Vector store unreachable: {}", e));
                report
                    .recommendations
                    .push("Check vector store credentials and connectivity".to_string());
                return report;
            }
        };

        if info.vector_count == 0 {
            report.issues.push("Index contains no vectors".to_string());
            report
                .recommendations
                .push("Run a rebuild to populate the index".to_string());
            return report;
        }

        self.check_sentinel(&mut report).await;
        self.check_sample(&mut report).await;

        // Entries come in pairs plus the sentinel, so a healthy count is odd.
        if info.vector_count % 2 == 0 {
            report.recommendations.push(format!(
                "Vector count {} is even; a complete index holds two entries \
                 per item plus the sentinel. A rebuild may have been interrupted",
                info.vector_count
            ));
        }

        report.is_valid = report.issues.is_empty();
        report
    }

    async fn check_sentinel(&self, report: &mut ValidationReport) {
        let sentinel = match self.index.fetch(&[SENTINEL_ID.to_string()]).await {
            Ok(records) => records.into_iter().next(),
            Err(e) => {
                report
                    .issues
                    .push(format!("Failed to fetch rebuild sentinel: {}", e));
                return;
            }
        };

        let Some(sentinel) = sentinel else {
            report
                .issues
                .push("Rebuild sentinel is missing".to_string());
            report
                .recommendations
                .push("Run a rebuild to restore staleness tracking".to_string());
            return;
        };

        let timestamp = sentinel
            .metadata
            .as_ref()
            .and_then(|md| md.get("timestamp"))
            .and_then(|v| v.as_str())
            .map(DateTime::parse_from_rfc3339);

        match timestamp {
            Some(Ok(_)) => {}
            Some(Err(_)) => report
                .issues
                .push("Rebuild sentinel timestamp is not valid RFC 3339".to_string()),
            None => report
                .issues
                .push("Rebuild sentinel has no timestamp metadata".to_string()),
        }
    }

    async fn check_sample(&self, report: &mut ValidationReport) {
        let matches = match self
            .index
            .query(QueryRequest {
                vector: vec![0.1; self.dimension],
                top_k: SAMPLE_SIZE,
                filter: Some("type = 'video'".to_string()),
                include_metadata: true,
            })
            .await
        {
            Ok(matches) => matches,
            Err(e) => {
                report
                    .issues
                    .push(format!("Sample query failed: {}", e));
                return;
            }
        };

        if matches.is_empty() {
            report
                .issues
                .push("No video entries found by sample query".to_string());
            return;
        }

        for m in &matches {
            let Some(metadata) = m.metadata.as_ref() else {
                report
                    .issues
                    .push(format!("Entry {} has no metadata", m.id));
                continue;
            };

            if metadata.get("title").and_then(|v| v.as_str()).is_none() {
                report
                    .issues
                    .push(format!("Entry {} is missing a title", m.id));
            }

            match metadata.get("searchType").and_then(|v| v.as_str()) {
                Some("general") => {}
                Some("statistical") => {
                    if metadata.get("originalId").and_then(|v| v.as_str()).is_none() {
                        report.issues.push(format!(
                            "Statistical entry {} is missing originalId",
                            m.id
                        ));
                    }
                }
                Some(other) => report.issues.push(format!(
                    "Entry {} has unknown searchType '{}'",
                    m.id, other
                )),
                None => report
                    .issues
                    .push(format!("Entry {} is missing searchType", m.id)),
            }

            if metadata.get("viewCount").and_then(|v| v.as_u64()).is_none() {
                report.issues.push(format!(
                    "Entry {} has a missing or non-numeric viewCount",
                    m.id
                ));
            }
        }
    }

    /// Destructive: wipe every record including the sentinel, so the next
    /// rebuild starts from scratch.
    #[inline]
    pub async fn cleanup(&self) -> Result<(), StoreError> {
        warn!("Cleaning up vector index (removes all entries)");
        self.index.reset().await?;

        // Reset does not cover reserved IDs on every backend.
        let _ = self.index.delete(&[SENTINEL_ID.to_string()]).await;

        info!("Vector index cleaned up");
        Ok(())
    }
}

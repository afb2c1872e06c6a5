
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{
    FetchedRecord, IndexInfo, QueryMatch, QueryRequest, StoreError, VectorIndex, VectorRecord,
};
use crate::config::VectorConfig;
use crate::{Result, VidsearchError};

const RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Client for the Upstash Vector REST API.
#[derive(Debug, Clone)]
pub struct UpstashClient {
    base_url: Url,
    token: String,
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    result: Vec<RawMatch>,
}

#[derive(Debug, Deserialize)]
struct RawMatch {
    id: String,
    score: f32,
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    result: Vec<Option<RawFetched>>,
}

#[derive(Debug, Deserialize)]
struct RawFetched {
    id: String,
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    result: DeleteResult,
}

#[derive(Debug, Deserialize)]
struct DeleteResult {
    deleted: u64,
}

#[derive(Debug, Deserialize)]
struct InfoResponse {
    result: RawInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInfo {
    vector_count: u64,
}

impl UpstashClient {
    #[inline]
    pub fn new(config: &VectorConfig) -> Result<Self> {
        let raw_url = config
            .url
            .as_deref()
            .ok_or_else(|| VidsearchError::Config("vector store URL is not set".to_string()))?;
        let base_url = Url::parse(raw_url)
            .map_err(|e| VidsearchError::Config(format!("invalid vector store URL: {}", e)))?;

        let token = config
            .token
            .clone()
            .ok_or_else(|| VidsearchError::Config("vector store token is not set".to_string()))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build()
            .into();

        Ok(Self {
            base_url,
            token,
            agent,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        self.base_url
            .join(path)
            .map_err(|e| StoreError::Rejected(format!("failed to build endpoint URL: {}", e)))
    }

    fn post(&self, path: &str, body: &serde_json::Value) -> Result<String, StoreError> {
        let url = self.endpoint(path)?;
        let body = body.to_string();

        self.make_request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Authorization", &format!("Bearer {}", self.token))
                .header("Content-Type", "application/json")
                .send(&body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn get(&self, path: &str) -> Result<String, StoreError> {
        let url = self.endpoint(path)?;

        self.make_request_with_retry(|| {
            self.agent
                .get(url.as_str())
                .header("Authorization", &format!("Bearer {}", self.token))
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String, StoreError>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=RETRY_ATTEMPTS {
            match request_fn() {
                Ok(response_text) => return Ok(response_text),
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Vector store server error (status {}), attempt {}/{}",
                                    status, attempt, RETRY_ATTEMPTS
                                );
                                true
                            } else {
                                return Err(StoreError::Rejected(format!("HTTP {}", status)));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Vector store transport error: {}, attempt {}/{}",
                                error, attempt, RETRY_ATTEMPTS
                            );
                            true
                        }
                        _ => false,
                    };

                    if !should_retry {
                        return Err(StoreError::Unavailable(error.to_string()));
                    }

                    last_error = Some(error.to_string());

                    if attempt < RETRY_ATTEMPTS {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        std::thread::sleep(Duration::from_millis(delay_ms));
                    }
                }
            }
        }

        Err(StoreError::Unavailable(
            last_error.unwrap_or_else(|| "request failed after retries".to_string()),
        ))
    }
}

#[async_trait]
impl VectorIndex for UpstashClient {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        debug!("Upserting {} vectors", records.len());

        let body = serde_json::to_value(&records)
            .map_err(|e| StoreError::Rejected(format!("failed to serialize records: {}", e)))?;

        self.post("/upsert", &body)?;
        Ok(())
    }

    async fn query(&self, request: QueryRequest) -> Result<Vec<QueryMatch>, StoreError> {
        let mut body = json!({
            "vector": request.vector,
            "topK": request.top_k,
            "includeMetadata": request.include_metadata,
        });
        if let Some(filter) = &request.filter {
            body["filter"] = json!(filter);
        }

        let response_text = self.post("/query", &body)?;

        let response: QueryResponse = serde_json::from_str(&response_text)
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .map(|m| QueryMatch {
                id: m.id,
                score: m.score,
                metadata: m.metadata,
            })
            .collect())
    }

    async fn fetch(&self, ids: &[String]) -> Result<Vec<FetchedRecord>, StoreError> {
        let body = json!({ "ids": ids, "includeMetadata": true });
        let response_text = self.post("/fetch", &body)?;

        let response: FetchResponse = serde_json::from_str(&response_text)
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .flatten()
            .map(|r| FetchedRecord {
                id: r.id,
                metadata: r.metadata,
            })
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let body = json!({ "ids": ids });
        let response_text = self.post("/delete", &body)?;

        let response: DeleteResponse = serde_json::from_str(&response_text)
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

        Ok(response.result.deleted)
    }

    async fn info(&self) -> Result<IndexInfo, StoreError> {
        let response_text = self.get("/info")?;

        let response: InfoResponse = serde_json::from_str(&response_text)
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

        Ok(IndexInfo {
            vector_count: response.result.vector_count,
        })
    }

    async fn reset(&self) -> Result<(), StoreError> {
        warn!("Resetting vector index (destructive)");
        self.post("/reset", &json!({}))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{Embedder, EmbeddingError};
use crate::config::EmbeddingConfig;
use crate::{Result, VidsearchError};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Client for the Gemini `embedContent` REST API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    base_url: Url,
    api_key: String,
    model: String,
    dimension: usize,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: String,
    content: EmbedContent<'a>,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: Vec<EmbedPart<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

impl GeminiClient {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| VidsearchError::Config("embedding API key is not set".to_string()))?;

        let base_url = Url::parse(DEFAULT_BASE_URL)
            .map_err(|e| VidsearchError::Config(format!("invalid embedding base URL: {}", e)))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build()
            .into();

        Ok(Self {
            base_url,
            api_key,
            model: config.model.clone(),
            dimension: config.dimension,
            agent,
            retry_attempts: config.retry_attempts.max(1),
        })
    }

    /// Override the service endpoint, used to point at a local test server.
    #[inline]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    fn embed_url(&self) -> Result<Url, EmbeddingError> {
        self.base_url
            .join(&format!("/v1beta/models/{}:embedContent", self.model))
            .map_err(|e| EmbeddingError::Rejected(format!("failed to build embed URL: {}", e)))
    }

    fn request_embedding(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = self.embed_url()?;

        let request = EmbedRequest {
            model: format!("models/{}", self.model),
            content: EmbedContent {
                parts: vec![EmbedPart { text }],
            },
        };

        let request_json = serde_json::to_string(&request)
            .map_err(|e| EmbeddingError::Rejected(format!("failed to serialize request: {}", e)))?;

        let response_text = self.make_request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .header("x-goog-api-key", &self.api_key)
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let embed_response: EmbedResponse = serde_json::from_str(&response_text).map_err(|e| {
            EmbeddingError::Unreachable(format!("failed to parse embedding response: {}", e))
        })?;

        let values = embed_response.embedding.values;
        if values.len() != self.dimension {
            return Err(EmbeddingError::Rejected(format!(
                "expected {} dimensions, service returned {}",
                self.dimension,
                values.len()
            )));
        }

        Ok(values)
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String, EmbeddingError>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("Embedding request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => return Ok(response_text),
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Embedding server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                // Client errors mean the input was rejected;
                                // retrying the same payload cannot succeed.
                                return Err(EmbeddingError::Rejected(format!(
                                    "HTTP {}",
                                    status
                                )));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Embedding transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => false,
                    };

                    if !should_retry {
                        return Err(EmbeddingError::Unreachable(error.to_string()));
                    }

                    last_error = Some(error.to_string());

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        std::thread::sleep(Duration::from_millis(delay_ms));
                    }
                }
            }
        }

        Err(EmbeddingError::Unreachable(
            last_error.unwrap_or_else(|| "request failed after retries".to_string()),
        ))
    }
}

#[async_trait]
impl Embedder for GeminiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        debug!("Generating embedding for text (length: {})", text.len());
        self.request_embedding(text)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

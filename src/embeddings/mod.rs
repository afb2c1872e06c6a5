// Embedding service boundary: text in, fixed-length vector out.

pub mod gemini;

use async_trait::async_trait;
use thiserror::Error;

pub use gemini::GeminiClient;

/// Failure modes of the embedding service, distinguishing a service that
/// cannot be reached from one that rejected the input.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding service unreachable: {0}")]
    Unreachable(String),
    #[error("Embedding input rejected: {0}")]
    Rejected(String),
}

/// Turns a text payload into a fixed-length vector. Injected so tests can
/// substitute a deterministic double for the external service.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Dimensionality of the vectors this embedder produces.
    fn dimension(&self) -> usize;
}

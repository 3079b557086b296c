//! Embedding generation for semantic search and retrieval.
//!
//! Every embedder maps text to a fixed-dimension vector. Chunks and questions
//! must be embedded by the same model for similarity scores to be meaningful.

mod hashing;
mod openai;
mod retry;

pub use hashing::HashingEmbedder;
pub use openai::OpenAIEmbedder;
pub use retry::{RetryPolicy, RetryingEmbedder};

use async_trait::async_trait;
use thiserror::Error;

/// Failure of an embedding request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("rate limited by embedding provider: {0}")]
    RateLimited(String),

    #[error("embedding request timed out")]
    Timeout,

    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),

    #[error("embedding provider rejected request: {0}")]
    Api(String),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbeddingError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EmbeddingError::RateLimited(_) | EmbeddingError::Timeout | EmbeddingError::Unavailable(_)
        )
    }
}

/// Trait for embedding generation.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Get the embedding dimensions.
    fn dimensions(&self) -> usize;
}

/// Check a returned vector against the embedder's declared dimension.
pub(crate) fn check_dimensions(
    expected: usize,
    vector: Vec<f32>,
) -> Result<Vec<f32>, EmbeddingError> {
    if vector.len() != expected {
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(EmbeddingError::RateLimited("429".into()).is_transient());
        assert!(EmbeddingError::Timeout.is_transient());
        assert!(EmbeddingError::Unavailable("503".into()).is_transient());
        assert!(!EmbeddingError::Api("bad key".into()).is_transient());
        assert!(!EmbeddingError::DimensionMismatch {
            expected: 3,
            actual: 2
        }
        .is_transient());
    }

    #[test]
    fn test_check_dimensions() {
        assert!(check_dimensions(2, vec![0.1, 0.2]).is_ok());
        assert_eq!(
            check_dimensions(3, vec![0.1]),
            Err(EmbeddingError::DimensionMismatch {
                expected: 3,
                actual: 1
            })
        );
    }
}

//! OpenAI embeddings implementation.

use super::{check_dimensions, Embedder, EmbeddingError};
use crate::error::Result;
use crate::openai::create_client_with_timeout;
use async_openai::error::OpenAIError;
use async_openai::types::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// Embedding requests should fail fast so the retry layer can take over.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// OpenAI-based embedder.
pub struct OpenAIEmbedder {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    dimensions: usize,
    batch_size: usize,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder with default settings.
    pub fn new() -> Result<Self> {
        Self::with_config("text-embedding-3-small", 1536, 100)
    }

    /// Create a new OpenAI embedder with custom model, dimensions and batch size.
    pub fn with_config(model: &str, dimensions: usize, batch_size: usize) -> Result<Self> {
        Ok(Self {
            client: create_client_with_timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))?,
            model: model.to_string(),
            dimensions,
            batch_size: batch_size.max(1),
        })
    }
}

/// Map a client error onto the transient/permanent split.
fn classify(err: OpenAIError) -> EmbeddingError {
    match err {
        OpenAIError::Reqwest(e) if e.is_timeout() => EmbeddingError::Timeout,
        OpenAIError::Reqwest(e) => match e.status() {
            Some(status) if status.as_u16() == 429 => EmbeddingError::RateLimited(e.to_string()),
            Some(status) if status.is_client_error() => EmbeddingError::Api(e.to_string()),
            _ => EmbeddingError::Unavailable(e.to_string()),
        },
        OpenAIError::ApiError(api) => {
            let code = api.code.clone().unwrap_or_default();
            let kind = api.r#type.clone().unwrap_or_default();
            let message = api.message.to_lowercase();
            if code.contains("rate_limit") || kind.contains("rate_limit") || message.contains("rate limit") {
                EmbeddingError::RateLimited(api.message)
            } else if kind == "server_error" || message.contains("overloaded") {
                EmbeddingError::Unavailable(api.message)
            } else {
                EmbeddingError::Api(api.message)
            }
        }
        OpenAIError::JSONDeserialize(e) => EmbeddingError::InvalidResponse(e.to_string()),
        other => EmbeddingError::Api(other.to_string()),
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    #[instrument(skip(self, text))]
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("Empty embedding response".to_string()))
    }

    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed_batch(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            let request = CreateEmbeddingRequestArgs::default()
                .model(&self.model)
                .input(EmbeddingInput::StringArray(chunk.to_vec()))
                .dimensions(self.dimensions as u32)
                .build()
                .map_err(|e| EmbeddingError::Api(format!("Failed to build request: {}", e)))?;

            let response = self
                .client
                .embeddings()
                .create(request)
                .await
                .map_err(classify)?;

            if response.data.len() != chunk.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "{} embeddings returned for {} inputs",
                    response.data.len(),
                    chunk.len()
                )));
            }

            // Sort by index to ensure correct order
            let mut embeddings: Vec<_> = response.data.into_iter().collect();
            embeddings.sort_by_key(|e| e.index);

            for embedding_data in embeddings {
                all_embeddings.push(check_dimensions(self.dimensions, embedding_data.embedding)?);
            }
        }

        debug!("Generated {} embeddings", all_embeddings.len());
        Ok(all_embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::error::ApiError;

    #[test]
    fn test_embedder_creation() {
        let embedder = OpenAIEmbedder::new().unwrap();
        assert_eq!(embedder.dimensions(), 1536);

        let embedder = OpenAIEmbedder::with_config("text-embedding-3-large", 3072, 0).unwrap();
        assert_eq!(embedder.dimensions(), 3072);
        assert_eq!(embedder.batch_size, 1);
    }

    fn api_error(message: &str, kind: Option<&str>, code: Option<&str>) -> OpenAIError {
        OpenAIError::ApiError(ApiError {
            message: message.to_string(),
            r#type: kind.map(str::to_string),
            param: None,
            code: code.map(str::to_string),
        })
    }

    #[test]
    fn test_classify_api_errors() {
        assert!(matches!(
            classify(api_error("Rate limit reached", Some("requests"), Some("rate_limit_exceeded"))),
            EmbeddingError::RateLimited(_)
        ));
        assert!(matches!(
            classify(api_error("The server is overloaded", Some("server_error"), None)),
            EmbeddingError::Unavailable(_)
        ));
        assert!(matches!(
            classify(api_error("Incorrect API key provided", Some("invalid_request_error"), None)),
            EmbeddingError::Api(_)
        ));
    }
}

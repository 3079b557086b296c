//! Pre-flight checks before expensive operations.
//!
//! Validates that required configuration is available before starting
//! operations that would otherwise fail midway.

use crate::config::{AnswerMode, EmbeddingProvider, Settings};
use crate::error::{Result, WizardError};

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Ingesting and backfilling need the embedding provider.
    Ingest,
    /// Asking needs the embedding provider and, in openai mode, the chat model.
    Ask,
    /// Search needs the embedding provider.
    Search,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    let uses_openai_embeddings = settings.embedding.provider == EmbeddingProvider::OpenAI;
    let needs_key = match operation {
        Operation::Ingest | Operation::Search => uses_openai_embeddings,
        Operation::Ask => uses_openai_embeddings || settings.answer.mode == AnswerMode::OpenAI,
    };

    if needs_key {
        check_api_key()?;
    }
    Ok(())
}

/// Check if OpenAI API key is configured.
fn check_api_key() -> Result<()> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(WizardError::Config(
            "OPENAI_API_KEY is empty. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
        Err(_) => Err(WizardError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...' \
             or use embedding.provider = \"hashing\" for offline runs"
                .to_string(),
        )),
    }
}

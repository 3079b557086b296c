//! Error types for Blox Wizard.

use crate::embedding::EmbeddingError;
use thiserror::Error;

/// Library-level error type for Blox Wizard operations.
#[derive(Error, Debug)]
pub enum WizardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid transcript: {0}")]
    InvalidTranscript(String),

    #[error("Transcript has no segments")]
    EmptyTranscript,

    #[error("Malformed segment at index {index}: {reason}")]
    MalformedSegment { index: usize, reason: String },

    #[error("Embedding generation failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Search unavailable: {0}")]
    SearchUnavailable(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Question cache error: {0}")]
    Cache(String),

    #[error("Answer synthesis failed: {0}")]
    Synthesis(String),

    #[error("Video not found: {0}")]
    VideoNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),
}

impl WizardError {
    /// Whether this error rejects a single transcript at ingest time.
    ///
    /// Such errors are fatal for that video only; batch jobs record them and move on.
    pub fn is_transcript_error(&self) -> bool {
        matches!(
            self,
            WizardError::InvalidTranscript(_)
                | WizardError::EmptyTranscript
                | WizardError::MalformedSegment { .. }
        )
    }
}

/// Result type alias for Blox Wizard operations.
pub type Result<T> = std::result::Result<T, WizardError>;

//! Configuration settings for Blox Wizard.

use crate::error::{Result, WizardError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingSettings,
    pub search: SearchSettings,
    pub answer: AnswerSettings,
    pub cache: CacheSettings,
    pub vector_store: VectorStoreSettings,
    pub ingest: IngestSettings,
    pub links: LinkSettings,
    pub server: ServerSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.blox-wizard".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Embedding provider type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// OpenAI embeddings API (default).
    #[default]
    OpenAI,
    /// Offline feature hashing, no API key needed.
    Hashing,
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(EmbeddingProvider::OpenAI),
            "hashing" | "hash" | "local" => Ok(EmbeddingProvider::Hashing),
            _ => Err(format!("Unknown embedding provider: {}", s)),
        }
    }
}

impl std::fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingProvider::OpenAI => write!(f, "openai"),
            EmbeddingProvider::Hashing => write!(f, "hashing"),
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
    /// Inputs per embeddings request.
    pub batch_size: usize,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Requests in flight at once.
    pub max_concurrent_requests: usize,
    /// Minimum spacing between requests (0 disables).
    pub min_request_interval_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::OpenAI,
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            batch_size: 100,
            max_retries: 3,
            base_backoff_ms: 500,
            max_backoff_ms: 8_000,
            max_concurrent_requests: 4,
            min_request_interval_ms: 0,
        }
    }
}

/// Content chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Chunk window in seconds.
    pub window_seconds: f64,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            window_seconds: 30.0,
        }
    }
}

/// Retrieval defaults, used when a request leaves them unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub max_results: usize,
    /// Minimum cosine similarity for a chunk to be returned.
    pub similarity_threshold: f32,
    /// Most chunks any single video may contribute to one result list.
    pub max_per_video: Option<usize>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_results: 5,
            similarity_threshold: 0.2,
            max_per_video: None,
        }
    }
}

/// How answer text is composed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    /// Sentences selected from the retrieved excerpts (default).
    #[default]
    Extractive,
    /// Chat model grounded in the retrieved excerpts.
    OpenAI,
}

impl std::str::FromStr for AnswerMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "extractive" => Ok(AnswerMode::Extractive),
            "openai" | "llm" => Ok(AnswerMode::OpenAI),
            _ => Err(format!("Unknown answer mode: {}", s)),
        }
    }
}

impl std::fmt::Display for AnswerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnswerMode::Extractive => write!(f, "extractive"),
            AnswerMode::OpenAI => write!(f, "openai"),
        }
    }
}

/// Answer synthesis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerSettings {
    pub mode: AnswerMode,
    /// LLM model for the openai mode.
    pub model: String,
    pub temperature: f32,
    /// Sentences kept by the extractive mode.
    pub max_sentences: usize,
}

impl Default for AnswerSettings {
    fn default() -> Self {
        Self {
            mode: AnswerMode::Extractive,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            max_sentences: 4,
        }
    }
}

/// Question cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    /// Lifetime of a cached answer. `None` keeps answers until the corpus changes.
    pub ttl_hours: Option<u64>,
    /// Serve the nearest cached question at or above this similarity. Off when unset.
    pub semantic_match_threshold: Option<f32>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_hours: Some(168),
            semantic_match_threshold: None,
        }
    }
}

/// Vector store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreSettings {
    /// Vector store provider (sqlite, memory).
    pub provider: String,
    /// Path to SQLite database (for sqlite provider).
    pub sqlite_path: String,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            provider: "sqlite".to_string(),
            sqlite_path: "~/.blox-wizard/wizard.db".to_string(),
        }
    }
}

/// Batch ingest settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Videos processed concurrently.
    pub max_concurrent_videos: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            max_concurrent_videos: 4,
        }
    }
}

/// Video link settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// Watch page; the external ID goes in the `v` query parameter.
    pub watch_base_url: String,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            watch_base_url: "https://www.youtube.com/watch".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        let settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Settings>(&content)?
        } else {
            Settings::default()
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.chunking.window_seconds.is_finite() && self.chunking.window_seconds > 0.0) {
            return Err(WizardError::Config(
                "chunking.window_seconds must be greater than zero".to_string(),
            ));
        }
        if self.embedding.dimensions == 0 {
            return Err(WizardError::Config(
                "embedding.dimensions must be greater than zero".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(WizardError::Config(
                "embedding.batch_size must be greater than zero".to_string(),
            ));
        }
        if !self.search.similarity_threshold.is_finite() {
            return Err(WizardError::Config(
                "search.similarity_threshold must be a number".to_string(),
            ));
        }
        if self.search.max_per_video == Some(0) {
            return Err(WizardError::Config(
                "search.max_per_video must be at least 1".to_string(),
            ));
        }
        if let Some(t) = self.cache.semantic_match_threshold {
            if !(-1.0..=1.0).contains(&t) {
                return Err(WizardError::Config(
                    "cache.semantic_match_threshold must be within [-1, 1]".to_string(),
                ));
            }
        }
        if self.ingest.max_concurrent_videos == 0 {
            return Err(WizardError::Config(
                "ingest.max_concurrent_videos must be at least 1".to_string(),
            ));
        }
        url::Url::parse(&self.links.watch_base_url).map_err(|e| {
            WizardError::Config(format!("links.watch_base_url is not a URL: {}", e))
        })?;
        Ok(())
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| WizardError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("blox-wizard")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.vector_store.sqlite_path)
    }
}

//! Configuration module for Blox Wizard.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{AnswerPrompts, Prompts};
pub use settings::{
    AnswerMode, AnswerSettings, CacheSettings, ChunkingSettings, EmbeddingProvider,
    EmbeddingSettings, GeneralSettings, IngestSettings, LinkSettings, PromptSettings,
    SearchSettings, ServerSettings, Settings, VectorStoreSettings,
};

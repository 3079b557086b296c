//! Question cache.
//!
//! Memoizes answers by normalized question pattern so repeated questions skip
//! embedding, search and synthesis. Storage sits behind [`CacheStore`].

mod memory;
mod sqlite;

pub use memory::MemoryCacheStore;
pub use sqlite::SqliteCacheStore;

use crate::error::{Result, WizardError};
use crate::rag::VideoReference;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A previously asked question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedQuestion {
    pub normalized_pattern: String,
    /// Question embedding, kept for similarity lookups.
    pub embedding: Option<Vec<f32>>,
    pub usage_count: u32,
    pub last_used_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl CachedQuestion {
    /// A question seen for the first time, counted as one use.
    pub fn new(normalized_pattern: String, embedding: Option<Vec<f32>>, now: DateTime<Utc>) -> Self {
        Self {
            normalized_pattern,
            embedding,
            usage_count: 1,
            last_used_at: now,
            created_at: now,
        }
    }
}

/// The stored answer of a [`CachedQuestion`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedAnswer {
    /// Pattern of the owning question.
    pub question_pattern: String,
    pub answer_text: String,
    pub video_references: Vec<VideoReference>,
    pub suggested_questions: Vec<String>,
    pub confidence_score: f32,
    pub generated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedAnswer {
    /// Whether the answer may no longer be served at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A cached question together with its answer.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub question: CachedQuestion,
    pub answer: CachedAnswer,
}

/// Cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub questions: usize,
    pub expired: usize,
    pub total_usage: u64,
}

/// Storage for cached questions and answers.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up an entry by exact normalized pattern. Does not count as a use.
    async fn get(&self, pattern: &str) -> Result<Option<CacheEntry>>;

    /// Store a question and its answer, replacing any previous answer.
    ///
    /// An existing question keeps its creation time and gains one use.
    async fn put(&self, question: CachedQuestion, answer: CachedAnswer) -> Result<()>;

    /// Current generation. Every [`clear`](Self::clear) starts a new one.
    async fn generation(&self) -> Result<u64>;

    /// [`put`](Self::put) only if no clear happened since `generation` was
    /// read. Returns whether the entry was stored.
    async fn put_if_current(
        &self,
        question: CachedQuestion,
        answer: CachedAnswer,
        generation: u64,
    ) -> Result<bool>;

    /// Record a use: bump `usage_count` and `last_used_at`. Returns the new
    /// count, or `None` if the pattern is not cached.
    async fn touch(&self, pattern: &str, now: DateTime<Utc>) -> Result<Option<u32>>;

    /// Remove one entry. Returns whether it existed.
    async fn evict(&self, pattern: &str) -> Result<bool>;

    /// Nearest cached question by embedding with similarity at least
    /// `threshold`, among answers still live at `now`.
    async fn find_similar(
        &self,
        embedding: &[f32],
        threshold: f32,
        now: DateTime<Utc>,
    ) -> Result<Option<(CacheEntry, f32)>>;

    /// Remove entries whose answer expired at or before `now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    /// Remove everything and start a new generation. Returns the number of
    /// questions removed.
    async fn clear(&self) -> Result<usize>;

    async fn stats(&self, now: DateTime<Utc>) -> Result<CacheStats>;
}

/// Canonical cache key for a question: lowercased, trimmed, inner whitespace collapsed.
pub fn normalize_question(question: &str) -> String {
    question
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reject answers that do not belong to the question they are stored with.
pub(crate) fn check_ownership(question: &CachedQuestion, answer: &CachedAnswer) -> Result<()> {
    if question.normalized_pattern.is_empty() {
        return Err(WizardError::Cache("question pattern is empty".to_string()));
    }
    if answer.question_pattern != question.normalized_pattern {
        return Err(WizardError::Cache(format!(
            "answer for {:?} cannot be stored under {:?}",
            answer.question_pattern, question.normalized_pattern
        )));
    }
    Ok(())
}

//! The read path: question → cache → embed → search → synthesize.

use super::{AnswerSynthesizer, QueryRequest, QueryResponse, SynthesizedAnswer};
use crate::cache::{normalize_question, CacheEntry, CacheStore, CachedAnswer, CachedQuestion};
use crate::config::{CacheSettings, SearchSettings};
use crate::embedding::Embedder;
use crate::error::{Result, WizardError};
use crate::vector_store::{SearchResult, VectorStore};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, error, info, instrument, warn};

/// Upper bound on results per query, whatever the request asks for.
pub const MAX_RESULTS_CAP: usize = 50;

/// Longest accepted cache lifetime (100 years).
const MAX_TTL_HOURS: i64 = 24 * 365 * 100;

/// Per-key async mutexes; entries vanish once no request holds them.
#[derive(Default)]
struct KeyedLocks {
    inner: Mutex<HashMap<String, Weak<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    fn lock_for(&self, key: &str) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .inner
            .lock()
            .map_err(|e| WizardError::Cache(format!("Failed to acquire lock: {}", e)))?;

        locks.retain(|_, lock| lock.strong_count() > 0);
        if let Some(lock) = locks.get(key).and_then(Weak::upgrade) {
            return Ok(lock);
        }

        let lock = Arc::new(tokio::sync::Mutex::new(()));
        locks.insert(key.to_string(), Arc::downgrade(&lock));
        Ok(lock)
    }
}

/// RAG engine for question answering.
pub struct RagEngine {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    synthesizer: Arc<dyn AnswerSynthesizer>,
    cache: Option<Arc<dyn CacheStore>>,
    cache_settings: CacheSettings,
    search_settings: SearchSettings,
    locks: KeyedLocks,
}

impl RagEngine {
    /// Create an engine without a question cache.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        synthesizer: Arc<dyn AnswerSynthesizer>,
    ) -> Self {
        Self {
            embedder,
            store,
            synthesizer,
            cache: None,
            cache_settings: CacheSettings::default(),
            search_settings: SearchSettings::default(),
            locks: KeyedLocks::default(),
        }
    }

    /// Memoize answers in `cache`. Ignored when `settings.enabled` is false.
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>, settings: CacheSettings) -> Self {
        self.cache = settings.enabled.then_some(cache);
        self.cache_settings = settings;
        self
    }

    /// Defaults for requests that leave result count or threshold unset.
    pub fn with_search_settings(mut self, settings: SearchSettings) -> Self {
        self.search_settings = settings;
        self
    }

    /// Embed `query` and return matching chunks, best first.
    ///
    /// `max_per_video` falls back to the configured quota when unset.
    #[instrument(skip(self))]
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        threshold: f32,
        max_per_video: Option<usize>,
    ) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(WizardError::InvalidInput("Query must not be empty".to_string()));
        }
        let (limit, threshold) = self.resolve(Some(limit), Some(threshold))?;
        let max_per_video = max_per_video.or(self.search_settings.max_per_video);
        if max_per_video == Some(0) {
            return Err(WizardError::InvalidInput(
                "maxPerVideo must be at least 1".to_string(),
            ));
        }
        let embedding = self.embedder.embed(query).await?;
        self.store
            .search(&embedding, limit, threshold, max_per_video)
            .await
    }

    /// Answer a question, serving from the cache when possible.
    #[instrument(skip(self, request), fields(question = %request.question))]
    pub async fn ask(&self, request: &QueryRequest) -> Result<QueryResponse> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(WizardError::InvalidInput("Question must not be empty".to_string()));
        }
        let (limit, threshold) = self.resolve(request.max_results, request.similarity_threshold)?;

        let Some(cache) = self.cache.as_ref() else {
            let embedding = self.embedder.embed(question).await?;
            let answer = self.answer(question, &embedding, limit, threshold).await?;
            return Ok(response(answer, false));
        };

        let pattern = normalize_question(question);
        let lock = self.locks.lock_for(&pattern)?;
        let _guard = lock.lock().await;

        if let Some(hit) = self.cached(cache.as_ref(), &pattern).await {
            return Ok(hit);
        }

        // Read before searching: a clear after this point voids the answer.
        let generation = match cache.generation().await {
            Ok(generation) => Some(generation),
            Err(e) => {
                warn!(pattern = %pattern, "Failed to read cache generation: {}", e);
                None
            }
        };

        let embedding = self.embedder.embed(question).await?;

        if let Some(hit) = self.similar(cache.as_ref(), &embedding).await {
            return Ok(hit);
        }

        let answer = self.answer(question, &embedding, limit, threshold).await?;
        if let Some(generation) = generation {
            self.remember(cache.as_ref(), &pattern, embedding, &answer, generation)
                .await;
        }
        Ok(response(answer, false))
    }

    /// Like [`ask`](Self::ask), but failures become the polite fallback response.
    pub async fn ask_or_fallback(&self, request: &QueryRequest) -> QueryResponse {
        match self.ask(request).await {
            Ok(response) => response,
            Err(e) => {
                error!(question = %request.question, "Failed to answer question: {}", e);
                QueryResponse::fallback()
            }
        }
    }

    fn resolve(&self, max_results: Option<usize>, threshold: Option<f32>) -> Result<(usize, f32)> {
        let limit = max_results.unwrap_or(self.search_settings.max_results);
        if limit == 0 {
            return Err(WizardError::InvalidInput(
                "maxResults must be at least 1".to_string(),
            ));
        }
        let threshold = threshold.unwrap_or(self.search_settings.similarity_threshold);
        if !threshold.is_finite() {
            return Err(WizardError::InvalidInput(
                "similarityThreshold must be a number".to_string(),
            ));
        }
        Ok((limit.min(MAX_RESULTS_CAP), threshold))
    }

    async fn answer(
        &self,
        question: &str,
        embedding: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<SynthesizedAnswer> {
        let results = self
            .store
            .search(embedding, limit, threshold, self.search_settings.max_per_video)
            .await?;
        debug!("Retrieved {} chunks", results.len());
        self.synthesizer.synthesize(question, &results).await
    }

    /// Exact-match lookup. Cache failures count as a miss.
    async fn cached(&self, cache: &dyn CacheStore, pattern: &str) -> Option<QueryResponse> {
        match cache.get(pattern).await {
            Ok(Some(entry)) => self.serve(cache, entry).await,
            Ok(None) => None,
            Err(e) => {
                warn!(pattern = %pattern, "Cache lookup failed: {}", e);
                None
            }
        }
    }

    /// Nearest cached question, when similarity lookup is enabled.
    async fn similar(&self, cache: &dyn CacheStore, embedding: &[f32]) -> Option<QueryResponse> {
        let threshold = self.cache_settings.semantic_match_threshold?;
        match cache.find_similar(embedding, threshold, Utc::now()).await {
            Ok(Some((entry, score))) => {
                debug!(
                    pattern = %entry.question.normalized_pattern,
                    "Similar cached question (score {:.3})", score
                );
                self.serve(cache, entry).await
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Cache similarity lookup failed: {}", e);
                None
            }
        }
    }

    async fn serve(&self, cache: &dyn CacheStore, entry: CacheEntry) -> Option<QueryResponse> {
        let now = Utc::now();
        let pattern = &entry.question.normalized_pattern;
        if entry.answer.is_expired(now) {
            debug!(pattern = %pattern, "Cached answer expired");
            return None;
        }
        match cache.touch(pattern, now).await {
            Ok(Some(count)) => info!(pattern = %pattern, "Cache hit (used {} times)", count),
            Ok(None) => debug!(pattern = %pattern, "Cache entry vanished before touch"),
            Err(e) => warn!(pattern = %pattern, "Failed to record cache use: {}", e),
        }

        let answer = entry.answer;
        Some(QueryResponse {
            answer: answer.answer_text,
            video_references: answer.video_references,
            suggested_questions: answer.suggested_questions,
            confidence: answer.confidence_score,
            cache_hit: true,
        })
    }

    async fn remember(
        &self,
        cache: &dyn CacheStore,
        pattern: &str,
        embedding: Vec<f32>,
        answer: &SynthesizedAnswer,
        generation: u64,
    ) {
        let now = Utc::now();
        let expires_at = self.cache_settings.ttl_hours.map(|hours| {
            let hours = i64::try_from(hours).unwrap_or(i64::MAX).min(MAX_TTL_HOURS);
            now + Duration::hours(hours)
        });

        let question = CachedQuestion::new(pattern.to_string(), Some(embedding), now);
        let cached = CachedAnswer {
            question_pattern: pattern.to_string(),
            answer_text: answer.answer.clone(),
            video_references: answer.video_references.clone(),
            suggested_questions: answer.suggested_questions.clone(),
            confidence_score: answer.confidence,
            generated_at: now,
            expires_at,
        };

        match cache.put_if_current(question, cached, generation).await {
            Ok(true) => {}
            Ok(false) => debug!(pattern = %pattern, "Index changed while answering; answer not cached"),
            Err(e) => warn!(pattern = %pattern, "Failed to cache answer: {}", e),
        }
    }
}

fn response(answer: SynthesizedAnswer, cache_hit: bool) -> QueryResponse {
    QueryResponse {
        answer: answer.answer,
        video_references: answer.video_references,
        suggested_questions: answer.suggested_questions,
        confidence: answer.confidence,
        cache_hit,
    }
}

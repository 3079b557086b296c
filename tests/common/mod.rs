//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use blox_wizard::cache::MemoryCacheStore;
use blox_wizard::config::{EmbeddingProvider, Settings};
use blox_wizard::embedding::{Embedder, EmbeddingError, HashingEmbedder};
use blox_wizard::orchestrator::Orchestrator;
use blox_wizard::rag::{AnswerSynthesizer, ExtractiveSynthesizer, SynthesizedAnswer, VideoLinks};
use blox_wizard::transcript::RawVideo;
use blox_wizard::vector_store::{MemoryVectorStore, SearchResult};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

pub const DIMS: usize = 128;

/// Offline settings: hashing embeddings, in-memory stores, no backoff delay.
pub fn offline_settings() -> Settings {
    let mut settings = Settings::default();
    settings.embedding.provider = EmbeddingProvider::Hashing;
    settings.embedding.dimensions = DIMS as u32;
    settings.embedding.base_backoff_ms = 1;
    settings.embedding.max_backoff_ms = 2;
    settings.vector_store.provider = "memory".to_string();
    settings
}

pub fn video(id: &str, title: &str, segments: Value) -> RawVideo {
    serde_json::from_value(json!({
        "videoId": id,
        "externalId": format!("yt-{}", id),
        "title": title,
        "creator": "BloxDev",
        "segments": segments,
    }))
    .unwrap()
}

/// A small tutorial library covering a few Roblox topics.
pub fn library() -> Vec<RawVideo> {
    vec![
        video(
            "tween-101",
            "TweenService Basics",
            json!([
                {"text": "Today we learn TweenService.", "offsetMs": 0, "durationMs": 4000},
                {"text": "TweenService moves a part smoothly between positions.", "offsetMs": 4000, "durationMs": 6000},
                {"text": "Create TweenInfo to set the easing style and time.", "offsetMs": 31000, "durationMs": 6000}
            ]),
        ),
        video(
            "gui-101",
            "Making Your First GUI",
            json!([
                {"text": "Insert a ScreenGui into StarterGui.", "offsetMs": 0, "durationMs": 5000},
                {"text": "Add a TextButton inside a Frame.", "offsetMs": 5000, "durationMs": 5000}
            ]),
        ),
    ]
}

/// Orchestrator over the given embedder with in-memory stores.
pub fn orchestrator_with(embedder: Arc<dyn Embedder>) -> Orchestrator {
    Orchestrator::with_components(
        offline_settings(),
        embedder,
        Arc::new(MemoryVectorStore::new()),
        Arc::new(MemoryCacheStore::new()),
    )
}

/// Fails with a transient error a set number of times, then delegates.
pub struct FlakyEmbedder {
    inner: HashingEmbedder,
    failures_left: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FlakyEmbedder {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: HashingEmbedder::new(DIMS),
            failures_left: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        }
    }

    fn trip(&self) -> Result<(), EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(EmbeddingError::RateLimited("slow down".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.trip()?;
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.trip()?;
        self.inner.embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        DIMS
    }
}

/// Rejects any text containing "POISON" with a permanent error.
pub struct PoisonEmbedder {
    inner: HashingEmbedder,
}

impl PoisonEmbedder {
    pub fn new() -> Self {
        Self {
            inner: HashingEmbedder::new(DIMS),
        }
    }
}

#[async_trait]
impl Embedder for PoisonEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.contains("POISON") {
            return Err(EmbeddingError::Api("content rejected".to_string()));
        }
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.iter().any(|t| t.contains("POISON")) {
            return Err(EmbeddingError::Api("content rejected".to_string()));
        }
        self.inner.embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        DIMS
    }
}

/// Extractive answers that wait for `release` before returning.
pub struct GatedSynthesizer {
    inner: ExtractiveSynthesizer,
    pub started: Notify,
    pub release: Notify,
}

impl GatedSynthesizer {
    pub fn new() -> Self {
        let links = VideoLinks::new("https://www.youtube.com/watch").unwrap();
        Self {
            inner: ExtractiveSynthesizer::new(links, 4).unwrap(),
            started: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl AnswerSynthesizer for GatedSynthesizer {
    async fn synthesize(
        &self,
        question: &str,
        results: &[SearchResult],
    ) -> blox_wizard::Result<SynthesizedAnswer> {
        self.started.notify_one();
        self.release.notified().await;
        self.inner.synthesize(question, results).await
    }
}

//! Pipeline orchestrator for Blox Wizard.
//!
//! Drives the write path from raw transcript to indexed chunks, and wires the
//! configured components into a [`RagEngine`] for the read path.

use crate::cache::{CacheStore, MemoryCacheStore, SqliteCacheStore};
use crate::chunking::{Chunker, ChunkingConfig, TemporalChunker, TranscriptChunk};
use crate::config::{AnswerMode, EmbeddingProvider, EmbeddingSettings, Prompts, Settings};
use crate::embedding::{Embedder, HashingEmbedder, OpenAIEmbedder, RetryPolicy, RetryingEmbedder};
use crate::error::{Result, WizardError};
use crate::rag::{AnswerSynthesizer, ExtractiveSynthesizer, OpenAISynthesizer, RagEngine, VideoLinks};
use crate::transcript::{normalize_str, RawVideo, VideoTranscript};
use crate::vector_store::{MemoryVectorStore, SqliteVectorStore, StoredTranscript, VectorStore};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// The main orchestrator for the Blox Wizard pipeline.
pub struct Orchestrator {
    settings: Settings,
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
    cache: Arc<dyn CacheStore>,
    chunker: Arc<dyn Chunker>,
}

impl Orchestrator {
    /// Create an orchestrator from settings.
    pub fn new(settings: Settings) -> Result<Self> {
        let embedder = build_embedder(&settings.embedding)?;

        let (vector_store, cache): (Arc<dyn VectorStore>, Arc<dyn CacheStore>) =
            match settings.vector_store.provider.as_str() {
                "sqlite" => {
                    let path = settings.sqlite_path();
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    (
                        Arc::new(SqliteVectorStore::new(&path)?),
                        Arc::new(SqliteCacheStore::new(&path)?),
                    )
                }
                "memory" => (
                    Arc::new(MemoryVectorStore::new()),
                    Arc::new(MemoryCacheStore::new()),
                ),
                other => {
                    return Err(WizardError::Config(format!(
                        "Unknown vector store provider: {}",
                        other
                    )))
                }
            };

        Ok(Self::with_components(settings, embedder, vector_store, cache))
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(
        settings: Settings,
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<dyn VectorStore>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            settings,
            embedder,
            vector_store,
            cache,
            chunker: Arc::new(TemporalChunker::new()),
        }
    }

    pub fn vector_store(&self) -> Arc<dyn VectorStore> {
        self.vector_store.clone()
    }

    pub fn cache(&self) -> Arc<dyn CacheStore> {
        self.cache.clone()
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Build the read-path engine over this orchestrator's components.
    pub fn rag_engine(&self) -> Result<RagEngine> {
        let links = VideoLinks::new(&self.settings.links.watch_base_url)?;
        let extractive = ExtractiveSynthesizer::new(links, self.settings.answer.max_sentences)?;

        let synthesizer: Arc<dyn AnswerSynthesizer> = match self.settings.answer.mode {
            AnswerMode::Extractive => Arc::new(extractive),
            AnswerMode::OpenAI => {
                let prompts = Prompts::load(
                    self.settings.prompts.custom_dir.as_deref(),
                    Some(&self.settings.prompts.variables),
                )?;
                info!("Using {} for answers", self.settings.answer.model);
                Arc::new(OpenAISynthesizer::new(
                    &self.settings.answer.model,
                    self.settings.answer.temperature,
                    prompts,
                    extractive,
                )?)
            }
        };

        Ok(
            RagEngine::new(self.embedder.clone(), self.vector_store.clone(), synthesizer)
                .with_search_settings(self.settings.search.clone())
                .with_cache(self.cache.clone(), self.settings.cache.clone()),
        )
    }

    fn chunking_config(&self) -> ChunkingConfig {
        ChunkingConfig {
            window_seconds: self.settings.chunking.window_seconds,
        }
    }

    /// Validate, chunk, embed and store one video.
    pub async fn ingest(&self, raw: RawVideo) -> Result<IngestReport> {
        let transcript = raw.into_transcript()?;
        self.ingest_transcript(transcript).await
    }

    /// Chunk, embed and store an already-validated transcript, replacing any
    /// previous version of the video.
    #[instrument(skip(self, transcript), fields(video_id = %transcript.video_id()))]
    pub async fn ingest_transcript(&self, transcript: VideoTranscript) -> Result<IngestReport> {
        let report = self.index(&transcript).await?;
        self.invalidate_cache().await;
        Ok(report)
    }

    /// Ingest many videos concurrently. Each video succeeds or fails on its own.
    pub async fn ingest_batch(&self, videos: Vec<RawVideo>) -> Vec<BatchItem> {
        let concurrency = self.settings.ingest.max_concurrent_videos.max(1);

        let outcomes: Vec<BatchItem> = stream::iter(videos)
            .map(|raw| async move {
                let video_id = raw.video_id.clone();
                let result = match raw.into_transcript() {
                    Ok(transcript) => self.index(&transcript).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = &result {
                    warn!(video_id = %video_id, "Ingest failed: {}", e);
                }
                BatchItem { video_id, result }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        if outcomes.iter().any(|o| o.result.is_ok()) {
            self.invalidate_cache().await;
        }
        outcomes
    }

    /// Re-chunk and re-embed a video from its stored transcript.
    #[instrument(skip(self))]
    pub async fn rechunk(&self, video_id: &str) -> Result<IngestReport> {
        let stored = self
            .vector_store
            .load_transcript(video_id)
            .await?
            .ok_or_else(|| WizardError::VideoNotFound(video_id.to_string()))?;

        let transcript = restore(stored)?;
        info!("Rechunking '{}' from stored transcript", transcript.metadata.title);
        let report = self.index(&transcript).await?;
        self.invalidate_cache().await;
        Ok(report)
    }

    /// Re-chunk every stored transcript. Unusable transcripts are reported, not fatal.
    pub async fn rechunk_all(&self) -> Result<Vec<BatchItem>> {
        let stored = self.vector_store.load_transcripts().await?;
        let concurrency = self.settings.ingest.max_concurrent_videos.max(1);

        let outcomes: Vec<BatchItem> = stream::iter(stored)
            .map(|stored| async move {
                let video_id = stored.metadata.video_id.clone();
                let result = match restore(stored) {
                    Ok(transcript) => self.index(&transcript).await,
                    Err(e) => Err(e),
                };
                BatchItem { video_id, result }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        if outcomes.iter().any(|o| o.result.is_ok()) {
            self.invalidate_cache().await;
        }
        Ok(outcomes)
    }

    /// Embed stored chunks that have no embedding yet.
    #[instrument(skip(self))]
    pub async fn embed_missing(&self, limit: Option<usize>) -> Result<BackfillReport> {
        let mut chunks = self.vector_store.chunks_missing_embeddings(limit).await?;
        let pending = chunks.len();
        if pending == 0 {
            return Ok(BackfillReport::default());
        }

        info!("Backfilling embeddings for {} chunks", pending);
        let mut failures = self.embed_chunks(&mut chunks).await;

        let mut embedded = 0;
        for chunk in chunks {
            let Some(embedding) = chunk.embedding else {
                continue;
            };
            match self
                .vector_store
                .set_embedding(&chunk.transcript_id, chunk.chunk_index, embedding)
                .await
            {
                Ok(()) => embedded += 1,
                Err(e) => {
                    warn!(
                        video_id = %chunk.transcript_id,
                        chunk_index = chunk.chunk_index,
                        "Failed to store embedding: {}",
                        e
                    );
                    failures.push(ChunkFailure {
                        video_id: chunk.transcript_id,
                        chunk_index: chunk.chunk_index,
                        error: e.to_string(),
                    });
                }
            }
        }

        if embedded > 0 {
            self.invalidate_cache().await;
        }
        Ok(BackfillReport {
            pending,
            embedded,
            failures,
        })
    }

    /// Check that every stored transcript still normalizes.
    pub async fn verify(&self) -> Result<Vec<TranscriptHealth>> {
        let stored = self.vector_store.load_transcripts().await?;
        Ok(stored.iter().map(TranscriptHealth::check).collect())
    }

    /// Delete a video and its chunks.
    pub async fn delete(&self, video_id: &str) -> Result<bool> {
        let existed = self.vector_store.delete_transcript(video_id).await?;
        if existed {
            self.invalidate_cache().await;
        }
        Ok(existed)
    }

    async fn index(&self, transcript: &VideoTranscript) -> Result<IngestReport> {
        let video_id = transcript.video_id();
        let mut chunks = self
            .chunker
            .chunk(video_id, &transcript.segments, &self.chunking_config());
        debug!("Created {} chunks", chunks.len());

        let failures = self.embed_chunks(&mut chunks).await;
        let chunks_embedded = chunks.iter().filter(|c| c.is_embedded()).count();

        self.vector_store.replace_transcript(transcript, &chunks).await?;

        info!(
            video_id = %video_id,
            "Indexed {} chunks ({} embedded, {} failed)",
            chunks.len(),
            chunks_embedded,
            failures.len()
        );

        Ok(IngestReport {
            video_id: video_id.to_string(),
            title: transcript.metadata.title.clone(),
            chunks_created: chunks.len(),
            chunks_embedded,
            failures,
        })
    }

    /// Attach embeddings in batches. A failed batch is retried chunk by chunk
    /// so one bad chunk does not take its siblings down.
    async fn embed_chunks(&self, chunks: &mut [TranscriptChunk]) -> Vec<ChunkFailure> {
        let batch_size = self.settings.embedding.batch_size.max(1);
        let mut failures = Vec::new();

        for batch in chunks.chunks_mut(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            match self.embedder.embed_batch(&texts).await {
                Ok(embeddings) if embeddings.len() == batch.len() => {
                    for (chunk, embedding) in batch.iter_mut().zip(embeddings) {
                        chunk.embedding = Some(embedding);
                    }
                    continue;
                }
                Ok(embeddings) => warn!(
                    "Embedding batch returned {} vectors for {} chunks",
                    embeddings.len(),
                    batch.len()
                ),
                Err(e) => warn!("Embedding batch failed, retrying per chunk: {}", e),
            }

            for chunk in batch.iter_mut() {
                match self.embedder.embed(&chunk.text).await {
                    Ok(embedding) => chunk.embedding = Some(embedding),
                    Err(e) => {
                        warn!(
                            video_id = %chunk.transcript_id,
                            chunk_index = chunk.chunk_index,
                            "Failed to embed chunk: {}",
                            e
                        );
                        failures.push(ChunkFailure {
                            video_id: chunk.transcript_id.clone(),
                            chunk_index: chunk.chunk_index,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        failures
    }

    /// Drop cached answers after the corpus changed.
    async fn invalidate_cache(&self) {
        match self.cache.clear().await {
            Ok(0) => {}
            Ok(n) => debug!("Cleared {} cached answers", n),
            Err(e) => warn!("Failed to clear question cache: {}", e),
        }
    }
}

/// Build the configured embedder, wrapped with retries and rate limiting.
pub fn build_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    let dimensions = settings.dimensions as usize;
    let inner: Arc<dyn Embedder> = match settings.provider {
        EmbeddingProvider::OpenAI => Arc::new(OpenAIEmbedder::with_config(
            &settings.model,
            dimensions,
            settings.batch_size,
        )?),
        EmbeddingProvider::Hashing => Arc::new(HashingEmbedder::new(dimensions)),
    };

    let policy = RetryPolicy {
        max_retries: settings.max_retries,
        base_delay: Duration::from_millis(settings.base_backoff_ms),
        max_delay: Duration::from_millis(settings.max_backoff_ms),
    };

    Ok(Arc::new(
        RetryingEmbedder::new(inner, policy)
            .with_max_concurrent(settings.max_concurrent_requests)
            .with_min_interval(Duration::from_millis(settings.min_request_interval_ms)),
    ))
}

/// Rebuild a transcript from its stored form.
fn restore(stored: StoredTranscript) -> Result<VideoTranscript> {
    let payload = stored
        .payload
        .ok_or_else(|| WizardError::InvalidTranscript("no stored transcript".to_string()))?;
    let segments = normalize_str(&payload)?;
    let m = stored.metadata;
    Ok(VideoTranscript::new(
        m.video_id,
        m.external_id,
        m.title,
        m.creator,
        Some(m.duration_seconds),
        segments,
    ))
}

/// Result of indexing one video.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub video_id: String,
    pub title: String,
    pub chunks_created: usize,
    pub chunks_embedded: usize,
    /// Chunks stored without an embedding.
    pub failures: Vec<ChunkFailure>,
}

impl IngestReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A chunk whose embedding failed permanently.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkFailure {
    pub video_id: String,
    pub chunk_index: u32,
    pub error: String,
}

/// Outcome for one video of a batch job.
#[derive(Debug)]
pub struct BatchItem {
    pub video_id: String,
    pub result: Result<IngestReport>,
}

/// Result of an embedding backfill.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    pub pending: usize,
    pub embedded: usize,
    pub failures: Vec<ChunkFailure>,
}

/// Read-time state of a stored transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptStatus {
    Usable,
    /// No transcript stored for the video.
    Missing,
    /// Not a segment array.
    Invalid,
    /// An array with no segments.
    Empty,
    /// Some segment failed validation.
    Malformed,
}

impl std::fmt::Display for TranscriptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TranscriptStatus::Usable => "usable",
            TranscriptStatus::Missing => "missing",
            TranscriptStatus::Invalid => "invalid",
            TranscriptStatus::Empty => "empty",
            TranscriptStatus::Malformed => "malformed",
        };
        f.write_str(s)
    }
}

/// Health of one stored transcript.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptHealth {
    pub video_id: String,
    pub title: String,
    pub status: TranscriptStatus,
    pub segments: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TranscriptHealth {
    fn check(stored: &StoredTranscript) -> Self {
        let (status, segments, detail) = match stored.payload.as_deref() {
            None => (TranscriptStatus::Missing, 0, None),
            Some(payload) => match normalize_str(payload) {
                Ok(segments) => (TranscriptStatus::Usable, segments.len(), None),
                Err(WizardError::EmptyTranscript) => (TranscriptStatus::Empty, 0, None),
                Err(e @ WizardError::MalformedSegment { .. }) => {
                    (TranscriptStatus::Malformed, 0, Some(e.to_string()))
                }
                Err(e) => (TranscriptStatus::Invalid, 0, Some(e.to_string())),
            },
        };

        if status != TranscriptStatus::Usable {
            warn!(video_id = %stored.metadata.video_id, "Stored transcript is {}", status);
        }

        Self {
            video_id: stored.metadata.video_id.clone(),
            title: stored.metadata.title.clone(),
            status,
            segments,
            detail,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.status == TranscriptStatus::Usable
    }
}

//! Vector store abstraction for Blox Wizard.
//!
//! Provides a trait-based interface for different vector database backends.
//! Both backends persist transcripts next to their chunks and rank by a
//! brute-force cosine scan through the shared [`rank`] routine.

mod memory;
mod sqlite;

pub use memory::MemoryVectorStore;
pub use sqlite::SqliteVectorStore;

use crate::chunking::TranscriptChunk;
use crate::error::Result;
use crate::transcript::{format_timestamp, VideoMetadata, VideoTranscript};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::warn;

/// A search result with score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// The matched chunk.
    pub chunk: TranscriptChunk,
    /// Cosine similarity to the query (higher is better).
    pub similarity_score: f32,
    /// Title of the owning video.
    pub title: String,
    /// Creator of the owning video.
    pub creator: String,
    /// Platform ID of the owning video.
    pub external_id: String,
}

impl SearchResult {
    /// Video ID of the matched chunk.
    pub fn video_id(&self) -> &str {
        &self.chunk.transcript_id
    }

    /// Format timestamp for display.
    pub fn format_timestamp(&self) -> String {
        format_timestamp(self.chunk.start_seconds)
    }
}

/// Summary information about an indexed video.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedVideo {
    #[serde(flatten)]
    pub metadata: VideoMetadata,
    /// Number of stored chunks.
    pub chunk_count: u32,
    /// Number of chunks with an embedding.
    pub embedded_count: u32,
    /// When the transcript was last (re)ingested.
    pub indexed_at: DateTime<Utc>,
}

/// A transcript as persisted, before validation.
///
/// `payload` is the stored segment JSON; `None` when the row has no transcript.
#[derive(Debug, Clone)]
pub struct StoredTranscript {
    pub metadata: VideoMetadata,
    pub payload: Option<String>,
}

/// Trait for vector store implementations.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Atomically replace a video's transcript and all of its chunks.
    async fn replace_transcript(
        &self,
        transcript: &VideoTranscript,
        chunks: &[TranscriptChunk],
    ) -> Result<()>;

    /// Attach an embedding to one stored chunk.
    async fn set_embedding(
        &self,
        transcript_id: &str,
        chunk_index: u32,
        embedding: Vec<f32>,
    ) -> Result<()>;

    /// Return up to `limit` embedded chunks scoring at least `min_score`,
    /// keeping at most `max_per_video` chunks of any one video.
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        min_score: f32,
        max_per_video: Option<usize>,
    ) -> Result<Vec<SearchResult>>;

    /// Delete a video's transcript and chunks. Returns whether it existed.
    async fn delete_transcript(&self, video_id: &str) -> Result<bool>;

    /// List all stored videos, most recently indexed first.
    async fn list_videos(&self) -> Result<Vec<IndexedVideo>>;

    /// Get a specific video's information.
    async fn get_video(&self, video_id: &str) -> Result<Option<IndexedVideo>>;

    /// Get all chunks for a video, in chunk order.
    async fn get_chunks(&self, video_id: &str) -> Result<Vec<TranscriptChunk>>;

    /// Chunks that have not been embedded yet, ordered by video and index.
    async fn chunks_missing_embeddings(&self, limit: Option<usize>)
        -> Result<Vec<TranscriptChunk>>;

    /// Load one stored transcript.
    async fn load_transcript(&self, video_id: &str) -> Result<Option<StoredTranscript>>;

    /// Load every stored transcript, ordered by video ID.
    async fn load_transcripts(&self) -> Result<Vec<StoredTranscript>>;

    /// Get total chunk count.
    async fn chunk_count(&self) -> Result<usize>;

    /// Index totals. Videos indexed after `since` count as recently processed.
    async fn stats(&self, since: DateTime<Utc>) -> Result<IndexStats>;
}

/// Totals over the whole index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub total_videos: usize,
    pub total_chunks: usize,
    pub embedded_chunks: usize,
    pub avg_chunks_per_video: f64,
    /// Videos (re)indexed since the requested instant.
    pub recently_processed: usize,
}

impl IndexStats {
    pub(crate) fn new(
        total_videos: usize,
        total_chunks: usize,
        embedded_chunks: usize,
        recently_processed: usize,
    ) -> Self {
        let avg_chunks_per_video = if total_videos == 0 {
            0.0
        } else {
            total_chunks as f64 / total_videos as f64
        };
        Self {
            total_videos,
            total_chunks,
            embedded_chunks,
            avg_chunks_per_video,
            recently_processed,
        }
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Score, filter and order candidate chunks.
///
/// Unembedded chunks are skipped; chunks whose dimension differs from the
/// query are skipped with a warning. Ties go to `(transcript_id, chunk_index)`
/// ascending so results are reproducible. With `max_per_video`, lower-ranked
/// chunks of a video that already filled its quota give way to other videos.
pub(crate) fn rank<'a, I>(
    query_embedding: &[f32],
    candidates: I,
    limit: usize,
    min_score: f32,
    max_per_video: Option<usize>,
) -> Vec<SearchResult>
where
    I: IntoIterator<Item = (&'a TranscriptChunk, &'a VideoMetadata)>,
{
    if limit == 0 {
        return Vec::new();
    }

    let mut scored: Vec<(f32, &TranscriptChunk, &VideoMetadata)> = candidates
        .into_iter()
        .filter_map(|(chunk, video)| {
            let embedding = chunk.embedding.as_deref()?;
            if embedding.len() != query_embedding.len() {
                warn!(
                    video_id = %chunk.transcript_id,
                    chunk_index = chunk.chunk_index,
                    "Skipping chunk with {} dimensions (query has {})",
                    embedding.len(),
                    query_embedding.len()
                );
                return None;
            }
            let score = cosine_similarity(query_embedding, embedding);
            (score >= min_score).then_some((score, chunk, video))
        })
        .collect();

    scored.sort_by(|a, b| {
        b.0.total_cmp(&a.0)
            .then_with(|| a.1.transcript_id.cmp(&b.1.transcript_id))
            .then_with(|| a.1.chunk_index.cmp(&b.1.chunk_index))
    });

    if let Some(quota) = max_per_video {
        let mut taken: HashMap<&str, usize> = HashMap::new();
        scored.retain(|(_, chunk, _)| {
            let count = taken.entry(chunk.transcript_id.as_str()).or_insert(0);
            *count += 1;
            *count <= quota
        });
    }
    scored.truncate(limit);

    scored
        .into_iter()
        .map(|(score, chunk, video)| SearchResult {
            chunk: chunk.clone(),
            similarity_score: score,
            title: video.title.clone(),
            creator: video.creator.clone(),
            external_id: video.external_id.clone(),
        })
        .collect()
}

/// Order for listings: newest first, then by ID.
pub(crate) fn listing_order(a: &IndexedVideo, b: &IndexedVideo) -> Ordering {
    b.indexed_at
        .cmp(&a.indexed_at)
        .then_with(|| a.metadata.video_id.cmp(&b.metadata.video_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: &str) -> VideoMetadata {
        VideoMetadata {
            video_id: id.to_string(),
            external_id: format!("ext-{}", id),
            title: format!("Video {}", id),
            creator: "Creator".to_string(),
            duration_seconds: 60.0,
        }
    }

    fn chunk(id: &str, index: u32, embedding: Option<Vec<f32>>) -> TranscriptChunk {
        let mut c = TranscriptChunk::new(index, id, format!("chunk {}", index), 0.0, 30.0);
        c.embedding = embedding;
        c
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c)).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);

        assert_eq!(cosine_similarity(&a, &[0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_rank_skips_unembedded_and_mismatched() {
        let video = meta("a");
        let chunks = vec![
            chunk("a", 0, None),
            chunk("a", 1, Some(vec![1.0, 0.0])),
            chunk("a", 2, Some(vec![1.0, 0.0, 0.0])),
        ];

        let results = rank(&[1.0, 0.0], chunks.iter().map(|c| (c, &video)), 10, -1.0, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.chunk_index, 1);
        assert_eq!(results[0].external_id, "ext-a");
    }

    #[test]
    fn test_rank_threshold_and_ties() {
        let va = meta("a");
        let vb = meta("b");
        let chunks = vec![
            (chunk("b", 0, Some(vec![1.0, 0.0])), &vb),
            (chunk("a", 3, Some(vec![1.0, 0.0])), &va),
            (chunk("a", 1, Some(vec![1.0, 0.0])), &va),
            (chunk("a", 2, Some(vec![0.0, 1.0])), &va),
        ];

        let results = rank(
            &[1.0, 0.0],
            chunks.iter().map(|(c, v)| (c, *v)),
            10,
            0.5,
            None,
        );

        let order: Vec<_> = results
            .iter()
            .map(|r| (r.video_id().to_string(), r.chunk.chunk_index))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a".to_string(), 1),
                ("a".to_string(), 3),
                ("b".to_string(), 0)
            ]
        );

        let top = rank(&[1.0, 0.0], chunks.iter().map(|(c, v)| (c, *v)), 1, 0.5, None);
        assert_eq!(top.len(), 1);
        assert!(rank(&[1.0, 0.0], chunks.iter().map(|(c, v)| (c, *v)), 0, 0.5, None).is_empty());
    }

    #[test]
    fn test_cosine_similarity_stays_in_range() {
        let a = vec![0.1f32, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7];
        let scaled: Vec<f32> = a.iter().map(|x| x * 3.000_001).collect();
        let score = cosine_similarity(&a, &scaled);
        assert!(score <= 1.0);
        let negated: Vec<f32> = a.iter().map(|x| -x).collect();
        assert!(cosine_similarity(&a, &negated) >= -1.0);
    }

    #[test]
    fn test_rank_caps_chunks_per_video() {
        let long = meta("long");
        let short = meta("short");
        let mut chunks: Vec<(TranscriptChunk, &VideoMetadata)> = (0..6)
            .map(|i| (chunk("long", i, Some(vec![1.0, 0.0])), &long))
            .collect();
        chunks.push((chunk("short", 0, Some(vec![0.8, 0.6])), &short));

        let uncapped = rank(&[1.0, 0.0], chunks.iter().map(|(c, v)| (c, *v)), 3, 0.1, None);
        assert!(uncapped.iter().all(|r| r.video_id() == "long"));

        let capped = rank(&[1.0, 0.0], chunks.iter().map(|(c, v)| (c, *v)), 3, 0.1, Some(2));
        let order: Vec<_> = capped
            .iter()
            .map(|r| (r.video_id().to_string(), r.chunk.chunk_index))
            .collect();
        assert_eq!(
            order,
            vec![
                ("long".to_string(), 0),
                ("long".to_string(), 1),
                ("short".to_string(), 0)
            ]
        );
    }

    #[test]
    fn test_index_stats_average() {
        let stats = IndexStats::new(4, 10, 8, 1);
        assert_eq!(stats.avg_chunks_per_video, 2.5);
        assert_eq!(IndexStats::new(0, 0, 0, 0).avg_chunks_per_video, 0.0);
    }
}

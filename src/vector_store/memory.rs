//! In-memory vector store implementation.
//!
//! Useful for testing and small datasets.

use super::{
    listing_order, rank, IndexStats, IndexedVideo, SearchResult, StoredTranscript, VectorStore,
};
use crate::chunking::TranscriptChunk;
use crate::error::{Result, WizardError};
use crate::transcript::VideoTranscript;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

struct Entry {
    stored: StoredTranscript,
    chunks: Vec<TranscriptChunk>,
    indexed_at: DateTime<Utc>,
}

impl Entry {
    fn summary(&self) -> IndexedVideo {
        IndexedVideo {
            metadata: self.stored.metadata.clone(),
            chunk_count: self.chunks.len() as u32,
            embedded_count: self.chunks.iter().filter(|c| c.is_embedded()).count() as u32,
            indexed_at: self.indexed_at,
        }
    }
}

/// In-memory vector store.
pub struct MemoryVectorStore {
    videos: RwLock<BTreeMap<String, Entry>>,
}

impl MemoryVectorStore {
    /// Create a new in-memory vector store.
    pub fn new() -> Self {
        Self {
            videos: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, Entry>>> {
        self.videos
            .read()
            .map_err(|e| WizardError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, Entry>>> {
        self.videos
            .write()
            .map_err(|e| WizardError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn replace_transcript(
        &self,
        transcript: &VideoTranscript,
        chunks: &[TranscriptChunk],
    ) -> Result<()> {
        let payload = serde_json::to_string(&transcript.segments)?;
        let mut videos = self.write()?;
        videos.insert(
            transcript.video_id().to_string(),
            Entry {
                stored: StoredTranscript {
                    metadata: transcript.metadata.clone(),
                    payload: Some(payload),
                },
                chunks: chunks.to_vec(),
                indexed_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn set_embedding(
        &self,
        transcript_id: &str,
        chunk_index: u32,
        embedding: Vec<f32>,
    ) -> Result<()> {
        let mut videos = self.write()?;
        let chunk = videos
            .get_mut(transcript_id)
            .and_then(|e| e.chunks.iter_mut().find(|c| c.chunk_index == chunk_index))
            .ok_or_else(|| {
                WizardError::VectorStore(format!(
                    "No chunk {} for video {}",
                    chunk_index, transcript_id
                ))
            })?;
        chunk.embedding = Some(embedding);
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        min_score: f32,
        max_per_video: Option<usize>,
    ) -> Result<Vec<SearchResult>> {
        let videos = self
            .videos
            .read()
            .map_err(|e| WizardError::SearchUnavailable(format!("index lock poisoned: {}", e)))?;

        let candidates = videos
            .values()
            .flat_map(|e| e.chunks.iter().map(move |c| (c, &e.stored.metadata)));

        Ok(rank(
            query_embedding,
            candidates,
            limit,
            min_score,
            max_per_video,
        ))
    }

    async fn delete_transcript(&self, video_id: &str) -> Result<bool> {
        Ok(self.write()?.remove(video_id).is_some())
    }

    async fn list_videos(&self) -> Result<Vec<IndexedVideo>> {
        let mut videos: Vec<IndexedVideo> = self.read()?.values().map(Entry::summary).collect();
        videos.sort_by(listing_order);
        Ok(videos)
    }

    async fn get_video(&self, video_id: &str) -> Result<Option<IndexedVideo>> {
        Ok(self.read()?.get(video_id).map(Entry::summary))
    }

    async fn get_chunks(&self, video_id: &str) -> Result<Vec<TranscriptChunk>> {
        Ok(self
            .read()?
            .get(video_id)
            .map(|e| e.chunks.clone())
            .unwrap_or_default())
    }

    async fn chunks_missing_embeddings(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<TranscriptChunk>> {
        let videos = self.read()?;
        Ok(videos
            .values()
            .flat_map(|e| e.chunks.iter())
            .filter(|c| !c.is_embedded())
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn load_transcript(&self, video_id: &str) -> Result<Option<StoredTranscript>> {
        Ok(self.read()?.get(video_id).map(|e| e.stored.clone()))
    }

    async fn load_transcripts(&self) -> Result<Vec<StoredTranscript>> {
        Ok(self.read()?.values().map(|e| e.stored.clone()).collect())
    }

    async fn chunk_count(&self) -> Result<usize> {
        Ok(self.read()?.values().map(|e| e.chunks.len()).sum())
    }

    async fn stats(&self, since: DateTime<Utc>) -> Result<IndexStats> {
        let videos = self.read()?;
        let chunks = videos.values().flat_map(|e| e.chunks.iter());
        Ok(IndexStats::new(
            videos.len(),
            chunks.clone().count(),
            chunks.filter(|c| c.is_embedded()).count(),
            videos.values().filter(|e| e.indexed_at > since).count(),
        ))
    }
}

//! Content chunking for breaking transcripts into searchable segments.
//!
//! Chunks are the unit of retrieval: fixed wall-clock windows of transcript text
//! with start/end bounds, later embedded and searched.

mod format;
mod temporal;

pub use format::{format_chunks, ChunkExport, OutputFormat, VideoExport};
pub use temporal::TemporalChunker;

use crate::transcript::{format_timestamp, TranscriptSegment};
use serde::{Deserialize, Serialize};

/// A chunk of a video transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptChunk {
    /// Position of this chunk in its transcript (0-based, contiguous).
    pub chunk_index: u32,
    /// ID of the owning transcript (the video ID).
    pub transcript_id: String,
    /// Space-joined text of the constituent segments.
    pub text: String,
    /// Start time in seconds.
    pub start_seconds: f64,
    /// End time in seconds.
    pub end_seconds: f64,
    /// Embedding vector, attached once by the embedding stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl TranscriptChunk {
    /// Create a new, unembedded chunk.
    pub fn new(
        chunk_index: u32,
        transcript_id: impl Into<String>,
        text: String,
        start_seconds: f64,
        end_seconds: f64,
    ) -> Self {
        Self {
            chunk_index,
            transcript_id: transcript_id.into(),
            text,
            start_seconds,
            end_seconds,
            embedding: None,
        }
    }

    /// Duration of this chunk in seconds.
    pub fn duration(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }

    /// Whether an embedding has been attached.
    pub fn is_embedded(&self) -> bool {
        self.embedding.is_some()
    }

    /// Format timestamp for display.
    pub fn format_timestamp(&self) -> String {
        format_timestamp(self.start_seconds)
    }
}

/// Configuration for chunking.
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Window length in seconds. A new chunk opens once a segment starts this
    /// far after the current chunk's start.
    pub window_seconds: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_seconds: 30.0,
        }
    }
}

/// Trait for transcript chunkers.
///
/// Implementations must be pure: the same segments always produce the same
/// chunks, and nothing carries over between calls.
pub trait Chunker: Send + Sync {
    /// Split normalized segments of one transcript into chunks.
    fn chunk(
        &self,
        transcript_id: &str,
        segments: &[TranscriptSegment],
        config: &ChunkingConfig,
    ) -> Vec<TranscriptChunk>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_timestamp_and_duration() {
        let chunk = TranscriptChunk::new(0, "v1", "text".to_string(), 125.0, 155.0);
        assert_eq!(chunk.format_timestamp(), "02:05");
        assert_eq!(chunk.duration(), 30.0);
        assert!(!chunk.is_embedded());
    }
}

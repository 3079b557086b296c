//! Time-based chunking implementation.
//!
//! Groups consecutive segments into fixed wall-clock windows. Segments are
//! never split and never shared between chunks.

use super::{Chunker, ChunkingConfig, TranscriptChunk};
use crate::transcript::TranscriptSegment;
use tracing::debug;

/// Time-based chunker.
pub struct TemporalChunker;

impl TemporalChunker {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TemporalChunker {
    fn default() -> Self {
        Self::new()
    }
}

/// Chunk being assembled.
struct OpenChunk<'a> {
    texts: Vec<&'a str>,
    start: f64,
    end: f64,
}

impl<'a> OpenChunk<'a> {
    fn start_at(segment: &'a TranscriptSegment) -> Self {
        let mut chunk = Self {
            texts: Vec::new(),
            start: segment.offset_seconds(),
            end: segment.end_seconds(),
        };
        chunk.push_text(&segment.text);
        chunk
    }

    fn push_text(&mut self, text: &'a str) {
        let text = text.trim();
        if !text.is_empty() {
            self.texts.push(text);
        }
    }

    fn extend(&mut self, segment: &'a TranscriptSegment) {
        self.push_text(&segment.text);
        self.end = self.end.max(segment.end_seconds());
    }

    /// `None` when every segment in the window was blank.
    fn finish(self, index: u32, transcript_id: &str) -> Option<TranscriptChunk> {
        if self.texts.is_empty() {
            return None;
        }
        Some(TranscriptChunk::new(
            index,
            transcript_id,
            self.texts.join(" ").trim().to_string(),
            self.start,
            self.end,
        ))
    }
}

impl Chunker for TemporalChunker {
    fn chunk(
        &self,
        transcript_id: &str,
        segments: &[TranscriptSegment],
        config: &ChunkingConfig,
    ) -> Vec<TranscriptChunk> {
        let mut chunks = Vec::new();
        let mut current: Option<OpenChunk<'_>> = None;

        for segment in segments {
            current = match current.take() {
                None => Some(OpenChunk::start_at(segment)),
                Some(open) if segment.offset_seconds() - open.start >= config.window_seconds => {
                    chunks.extend(open.finish(chunks.len() as u32, transcript_id));
                    Some(OpenChunk::start_at(segment))
                }
                Some(mut open) => {
                    open.extend(segment);
                    Some(open)
                }
            };
        }

        if let Some(open) = current {
            chunks.extend(open.finish(chunks.len() as u32, transcript_id));
        }

        debug!(
            "Chunked {} segments into {} chunks for {}",
            segments.len(),
            chunks.len(),
            transcript_id
        );
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(segments: &[TranscriptSegment], window: f64) -> Vec<TranscriptChunk> {
        TemporalChunker::new().chunk(
            "video",
            segments,
            &ChunkingConfig {
                window_seconds: window,
            },
        )
    }

    #[test]
    fn test_three_segments_single_window() {
        let segments = vec![
            TranscriptSegment::new("intro", 0, 5_000),
            TranscriptSegment::new("middle", 5_000, 20_000),
            TranscriptSegment::new("end", 25_000, 10_000),
        ];

        let chunks = chunk(&segments, 30.0);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "intro middle end");
        assert_eq!(chunks[0].start_seconds, 0.0);
        assert_eq!(chunks[0].end_seconds, 35.0);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].transcript_id, "video");
    }

    #[test]
    fn test_window_boundary_opens_new_chunk() {
        let segments = vec![
            TranscriptSegment::new("First segment", 0, 10_000),
            TranscriptSegment::new("Second segment", 15_000, 10_000),
            TranscriptSegment::new("Third segment", 30_000, 10_000),
            TranscriptSegment::new("Fourth segment", 45_000, 10_000),
            TranscriptSegment::new("Fifth segment", 61_000, 4_000),
        ];

        let chunks = chunk(&segments, 30.0);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "First segment Second segment");
        assert_eq!(chunks[1].text, "Third segment Fourth segment");
        assert_eq!(chunks[1].start_seconds, 30.0);
        assert_eq!(chunks[1].end_seconds, 55.0);
        assert_eq!(chunks[2].text, "Fifth segment");
        assert_eq!(
            chunks.iter().map(|c| c.chunk_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_long_segment_is_not_split() {
        let segments = vec![
            TranscriptSegment::new("a very long monologue", 0, 95_000),
            TranscriptSegment::new("after", 95_000, 1_000),
        ];

        let chunks = chunk(&segments, 30.0);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].end_seconds, 95.0);
        assert_eq!(chunks[1].start_seconds, 95.0);
    }

    #[test]
    fn test_text_is_trimmed_and_blank_segments_skipped() {
        let segments = vec![
            TranscriptSegment::new("  hello ", 0, 1_000),
            TranscriptSegment::new("   ", 1_000, 1_000),
            TranscriptSegment::new("world\n", 2_000, 1_000),
        ];

        let chunks = chunk(&segments, 30.0);
        assert_eq!(chunks[0].text, "hello world");
        assert_eq!(chunks[0].end_seconds, 3.0);
    }

    #[test]
    fn test_blank_window_yields_no_chunk() {
        let segments = vec![
            TranscriptSegment::new("first", 0, 1_000),
            TranscriptSegment::new("  ", 40_000, 1_000),
            TranscriptSegment::new("", 45_000, 1_000),
            TranscriptSegment::new("last", 80_000, 1_000),
        ];

        let chunks = chunk(&segments, 30.0);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| !c.text.is_empty()));
        assert_eq!(chunks[1].text, "last");
        assert_eq!(chunks[1].chunk_index, 1);
        assert!(chunk(&[TranscriptSegment::new(" ", 0, 1_000)], 30.0).is_empty());
    }

    #[test]
    fn test_end_never_shrinks() {
        let segments = vec![
            TranscriptSegment::new("long", 0, 20_000),
            TranscriptSegment::new("short", 2_000, 1_000),
        ];

        let chunks = chunk(&segments, 30.0);
        assert_eq!(chunks[0].end_seconds, 20.0);
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let segments: Vec<_> = (0..50)
            .map(|i| TranscriptSegment::new(format!("line {}", i), i * 4_000, 3_500))
            .collect();

        let first = chunk(&segments, 30.0);
        let second = chunk(&segments, 30.0);
        assert_eq!(first, second);

        for pair in first.windows(2) {
            assert_ne!(pair[0].text, pair[1].text);
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(chunk(&[], 30.0).is_empty());
    }
}

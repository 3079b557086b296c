//! Property tests for chunking and search.
//!
//! Chunks cover every segment exactly once, are reproducible, and raising the
//! similarity threshold never returns more results.

use blox_wizard::chunking::{Chunker, ChunkingConfig, TemporalChunker, TranscriptChunk};
use blox_wizard::transcript::{normalize_payload, TranscriptSegment, VideoTranscript};
use blox_wizard::vector_store::{MemoryVectorStore, VectorStore};
use proptest::prelude::*;
use serde_json::json;

/// Ordered segments with distinct words, built from gaps and durations.
fn arb_segments() -> impl Strategy<Value = Vec<TranscriptSegment>> {
    prop::collection::vec((0u64..20_000, 1u64..45_000), 1..40).prop_map(|steps| {
        let mut offset = 0u64;
        steps
            .into_iter()
            .enumerate()
            .map(|(i, (gap, duration))| {
                offset += gap;
                TranscriptSegment::new(format!("word{}", i), offset, duration)
            })
            .collect()
    })
}

fn arb_window() -> impl Strategy<Value = f64> {
    prop_oneof![Just(30.0), 5.0f64..120.0]
}

fn chunk(segments: &[TranscriptSegment], window: f64) -> Vec<TranscriptChunk> {
    TemporalChunker::new().chunk(
        "video",
        segments,
        &ChunkingConfig {
            window_seconds: window,
        },
    )
}

proptest! {
    #[test]
    fn chunks_cover_every_segment_once(segments in arb_segments(), window in arb_window()) {
        let chunks = chunk(&segments, window);

        let words: Vec<String> = chunks
            .iter()
            .flat_map(|c| c.text.split(' ').map(str::to_string).collect::<Vec<_>>())
            .collect();
        let expected: Vec<String> = segments.iter().map(|s| s.text.clone()).collect();
        prop_assert_eq!(words, expected);

        for (i, c) in chunks.iter().enumerate() {
            prop_assert_eq!(c.chunk_index as usize, i);
            prop_assert!(c.start_seconds < c.end_seconds);
        }
        for pair in chunks.windows(2) {
            prop_assert!(pair[0].start_seconds < pair[1].start_seconds);
            prop_assert_ne!(&pair[0].text, &pair[1].text);
        }
    }

    #[test]
    fn chunking_is_deterministic(segments in arb_segments(), window in arb_window()) {
        let first = chunk(&segments, window);
        let second = chunk(&segments, window);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn chunk_starts_respect_window(segments in arb_segments(), window in arb_window()) {
        let chunks = chunk(&segments, window);
        for c in &chunks {
            let inside: Vec<_> = segments
                .iter()
                .filter(|s| s.offset_seconds() >= c.start_seconds && s.offset_seconds() < c.start_seconds + window)
                .collect();
            prop_assert!(!inside.is_empty());
        }
    }

    #[test]
    fn raising_threshold_never_adds_results(
        vectors in prop::collection::vec(prop::collection::vec(-1.0f32..1.0, 4), 1..30),
        query in prop::collection::vec(-1.0f32..1.0, 4),
        low in -1.0f32..1.0,
        delta in 0.0f32..1.0,
    ) {
        let (at_low, at_high) = tokio_test::block_on(async {
            let store = MemoryVectorStore::new();
            let segments: Vec<_> = (0..vectors.len())
                .map(|i| json!({"text": format!("t{}", i), "offsetMs": i * 1000, "durationMs": 1000}))
                .collect();
            let segments = normalize_payload(&json!(segments)).unwrap();
            let transcript = VideoTranscript::new("v", "x", "T", "C", None, segments);

            let chunks: Vec<TranscriptChunk> = vectors
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    let mut c = TranscriptChunk::new(i as u32, "v", format!("t{}", i), i as f64, i as f64 + 1.0);
                    c.embedding = Some(v.clone());
                    c
                })
                .collect();
            store.replace_transcript(&transcript, &chunks).await.unwrap();

            let low_hits = store.search(&query, 100, low, None).await.unwrap();
            let high_hits = store.search(&query, 100, low + delta, None).await.unwrap();
            (low_hits, high_hits)
        });

        prop_assert!(at_high.len() <= at_low.len());
        for pair in at_low.windows(2) {
            prop_assert!(pair[0].similarity_score >= pair[1].similarity_score);
        }
    }
}

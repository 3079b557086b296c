//! Chunk export formatting (JSON, SRT, VTT).
//!
//! Exports the indexed chunks of one video so the retrieval windows can be
//! inspected next to the video, or loaded as captions in a player.

use super::TranscriptChunk;
use crate::error::Result;
use crate::transcript::VideoMetadata;
use serde::Serialize;

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Json,
    Srt,
    Vtt,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "srt" => Ok(OutputFormat::Srt),
            "vtt" | "webvtt" => Ok(OutputFormat::Vtt),
            _ => Err(format!("Unknown format: {}. Use json, srt, or vtt.", s)),
        }
    }
}

/// JSON-serializable video chunks for export.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoExport<'a> {
    pub video_id: &'a str,
    pub external_id: &'a str,
    pub title: &'a str,
    pub creator: &'a str,
    pub duration_seconds: f64,
    pub chunks: Vec<ChunkExport<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkExport<'a> {
    pub chunk_index: u32,
    pub text: &'a str,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub embedded: bool,
}

impl<'a> VideoExport<'a> {
    pub fn new(metadata: &'a VideoMetadata, chunks: &'a [TranscriptChunk]) -> Self {
        Self {
            video_id: &metadata.video_id,
            external_id: &metadata.external_id,
            title: &metadata.title,
            creator: &metadata.creator,
            duration_seconds: metadata.duration_seconds,
            chunks: chunks
                .iter()
                .map(|c| ChunkExport {
                    chunk_index: c.chunk_index,
                    text: &c.text,
                    start_seconds: c.start_seconds,
                    end_seconds: c.end_seconds,
                    embedded: c.is_embedded(),
                })
                .collect(),
        }
    }
}

/// Format the chunks of a video for output.
pub fn format_chunks(
    metadata: &VideoMetadata,
    chunks: &[TranscriptChunk],
    format: OutputFormat,
) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&VideoExport::new(
            metadata, chunks,
        ))?),
        OutputFormat::Srt => Ok(format_cues(chunks, String::new(), format_srt_timestamp)),
        OutputFormat::Vtt => Ok(format_cues(
            chunks,
            String::from("WEBVTT\n\n"),
            format_vtt_timestamp,
        )),
    }
}

/// Write one numbered cue per chunk.
fn format_cues(
    chunks: &[TranscriptChunk],
    mut output: String,
    timestamp: fn(f64) -> String,
) -> String {
    for (i, chunk) in chunks.iter().enumerate() {
        output.push_str(&format!("{}\n", i + 1));
        output.push_str(&format!(
            "{} --> {}\n",
            timestamp(chunk.start_seconds),
            timestamp(chunk.end_seconds)
        ));
        output.push_str(&chunk.text);
        output.push_str("\n\n");
    }

    output
}

fn split_millis(seconds: f64) -> (u64, u64, u64, u64) {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    (
        total_ms / 3_600_000,
        (total_ms % 3_600_000) / 60_000,
        (total_ms % 60_000) / 1000,
        total_ms % 1000,
    )
}

/// Format timestamp for SRT (00:00:00,000).
fn format_srt_timestamp(seconds: f64) -> String {
    let (hours, minutes, secs, ms) = split_millis(seconds);
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, ms)
}

/// Format timestamp for VTT (00:00:00.000).
fn format_vtt_timestamp(seconds: f64) -> String {
    let (hours, minutes, secs, ms) = split_millis(seconds);
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, ms)
}

//! Data models for ingested video transcripts.

use super::normalize::normalize_payload;
use crate::error::{Result, WizardError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single timed segment of spoken text, as supplied by the transcript platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSegment {
    /// Spoken text.
    pub text: String,
    /// Offset from the start of the video, in milliseconds.
    pub offset_ms: u64,
    /// Duration of the segment, in milliseconds. Always greater than zero.
    pub duration_ms: u64,
}

impl TranscriptSegment {
    /// Create a new transcript segment.
    pub fn new(text: impl Into<String>, offset_ms: u64, duration_ms: u64) -> Self {
        Self {
            text: text.into(),
            offset_ms,
            duration_ms,
        }
    }

    /// Start of the segment in seconds.
    pub fn offset_seconds(&self) -> f64 {
        self.offset_ms as f64 / 1000.0
    }

    /// Duration of the segment in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }

    /// End of the segment in seconds.
    pub fn end_seconds(&self) -> f64 {
        self.offset_ms.saturating_add(self.duration_ms) as f64 / 1000.0
    }
}

/// Identity and display metadata of an ingested video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    /// Internal video ID. Also the transcript ID of its chunks.
    pub video_id: String,
    /// ID on the hosting platform (e.g. the YouTube video ID).
    pub external_id: String,
    /// Video title.
    pub title: String,
    /// Channel or author name.
    pub creator: String,
    /// Total duration in seconds.
    pub duration_seconds: f64,
}

/// A complete, validated transcript for one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoTranscript {
    #[serde(flatten)]
    pub metadata: VideoMetadata,
    /// Ordered segments.
    pub segments: Vec<TranscriptSegment>,
}

impl VideoTranscript {
    /// Build a transcript from already-normalized segments.
    ///
    /// When `duration_seconds` is unknown it is derived from the last segment end.
    pub fn new(
        video_id: impl Into<String>,
        external_id: impl Into<String>,
        title: impl Into<String>,
        creator: impl Into<String>,
        duration_seconds: Option<f64>,
        segments: Vec<TranscriptSegment>,
    ) -> Self {
        let duration_seconds = duration_seconds.unwrap_or_else(|| spoken_duration(&segments));
        Self {
            metadata: VideoMetadata {
                video_id: video_id.into(),
                external_id: external_id.into(),
                title: title.into(),
                creator: creator.into(),
                duration_seconds,
            },
            segments,
        }
    }

    /// Video ID of this transcript.
    pub fn video_id(&self) -> &str {
        &self.metadata.video_id
    }

    /// Full transcript text (space-joined segments).
    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Latest segment end, in seconds.
fn spoken_duration(segments: &[TranscriptSegment]) -> f64 {
    segments
        .iter()
        .map(TranscriptSegment::end_seconds)
        .fold(0.0f64, f64::max)
}

/// A video as handed over by the transcript-fetching collaborator.
///
/// The segment payload is kept as raw JSON until it passes the normalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVideo {
    #[serde(alias = "video_id")]
    pub video_id: String,
    #[serde(alias = "external_id", alias = "youtubeId", alias = "youtube_id")]
    pub external_id: String,
    pub title: String,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default, alias = "duration_seconds")]
    pub duration_seconds: Option<f64>,
    #[serde(default, alias = "transcript", alias = "transcriptJson", alias = "transcript_json")]
    pub segments: Value,
}

impl RawVideo {
    /// Validate the segment payload and produce a transcript.
    pub fn into_transcript(self) -> Result<VideoTranscript> {
        if self.video_id.trim().is_empty() {
            return Err(WizardError::InvalidInput("videoId must not be empty".to_string()));
        }
        let segments = normalize_payload(&self.segments)?;
        Ok(VideoTranscript::new(
            self.video_id,
            self.external_id,
            self.title,
            self.creator.unwrap_or_else(|| "Unknown".to_string()),
            self.duration_seconds,
            segments,
        ))
    }

    /// Parse an ingest document holding either one video object or an array of them.
    pub fn parse_many(text: &str) -> Result<Vec<RawVideo>> {
        let value: Value = serde_json::from_str(text)?;
        let items = match value {
            Value::Array(items) => items,
            obj @ Value::Object(_) => vec![obj],
            other => {
                return Err(WizardError::InvalidInput(format!(
                    "expected a video object or an array of videos, found {}",
                    super::json_kind(&other)
                )))
            }
        };

        items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value(item).map_err(|e| {
                    WizardError::InvalidInput(format!("video #{}: {}", i, e))
                })
            })
            .collect()
    }
}

/// Format seconds as MM:SS or HH:MM:SS.
pub fn format_timestamp(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0) as u32;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_segment_seconds() {
        let seg = TranscriptSegment::new("hello", 5_500, 2_000);
        assert_eq!(seg.offset_seconds(), 5.5);
        assert_eq!(seg.duration_seconds(), 2.0);
        assert_eq!(seg.end_seconds(), 7.5);
    }

    #[test]
    fn test_end_saturates_on_huge_offsets() {
        let seg = TranscriptSegment::new("late", u64::MAX - 10, 1_000);
        assert_eq!(seg.end_seconds(), u64::MAX as f64 / 1000.0);
    }

    #[test]
    fn test_duration_derived_from_segments() {
        let transcript = VideoTranscript::new(
            "v1",
            "abc",
            "Title",
            "Creator",
            None,
            vec![
                TranscriptSegment::new("a", 0, 5_000),
                TranscriptSegment::new("b", 5_000, 20_000),
            ],
        );
        assert_eq!(transcript.metadata.duration_seconds, 25.0);
        assert_eq!(transcript.full_text(), "a b");
    }

    #[test]
    fn test_raw_video_into_transcript() {
        let raw: RawVideo = serde_json::from_value(json!({
            "videoId": "v1",
            "youtubeId": "dQw4w9WgXcQ",
            "title": "Intro to Scripting",
            "segments": [{"text": "hi", "offset": "0", "duration": "1500"}]
        }))
        .unwrap();

        let transcript = raw.into_transcript().unwrap();
        assert_eq!(transcript.metadata.external_id, "dQw4w9WgXcQ");
        assert_eq!(transcript.metadata.creator, "Unknown");
        assert_eq!(transcript.segments[0].duration_ms, 1500);
    }

    #[test]
    fn test_raw_video_missing_segments_is_invalid() {
        let raw: RawVideo = serde_json::from_value(json!({
            "videoId": "v1",
            "externalId": "x",
            "title": "No transcript"
        }))
        .unwrap();

        assert!(matches!(
            raw.into_transcript(),
            Err(WizardError::InvalidTranscript(_))
        ));
    }

    #[test]
    fn test_parse_many_accepts_object_or_array() {
        let one = r#"{"videoId": "a", "externalId": "x", "title": "A", "segments": []}"#;
        assert_eq!(RawVideo::parse_many(one).unwrap().len(), 1);

        let many = r#"[
            {"videoId": "a", "externalId": "x", "title": "A", "segments": []},
            {"video_id": "b", "external_id": "y", "title": "B", "segments": []}
        ]"#;
        let videos = RawVideo::parse_many(many).unwrap();
        assert_eq!(videos[1].video_id, "b");

        assert!(RawVideo::parse_many("42").is_err());
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(65.9), "01:05");
        assert_eq!(format_timestamp(3665.0), "01:01:05");
    }
}

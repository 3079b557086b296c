//! Transcript ingestion models and segment normalization.
//!
//! Transcripts arrive from an external fetcher as loosely-typed JSON. The
//! normalizer validates them into [`TranscriptSegment`]s before anything is
//! chunked or written.

mod models;
mod normalize;

pub use models::{
    format_timestamp, RawVideo, TranscriptSegment, VideoMetadata, VideoTranscript,
};
pub use normalize::{normalize_payload, normalize_str};

use serde_json::Value;

/// Human-readable name of a JSON value's type, for error messages.
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

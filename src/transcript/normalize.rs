//! Segment normalization.
//!
//! Turns a raw transcript payload into an ordered list of [`TranscriptSegment`]s,
//! rejecting payloads that are not arrays, are empty, or contain malformed
//! segments. Numeric fields may arrive as integers, decimals or numeric strings.

use super::{json_kind, TranscriptSegment};
use crate::error::{Result, WizardError};
use serde_json::{Map, Value};

const TEXT_KEY: &str = "text";
const OFFSET_KEYS: &[&str] = &["offsetMs", "offset", "offset_ms"];
const DURATION_KEYS: &[&str] = &["durationMs", "duration", "duration_ms"];

/// Normalize a serialized payload.
pub fn normalize_str(raw: &str) -> Result<Vec<TranscriptSegment>> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| WizardError::InvalidTranscript(format!("payload is not valid JSON: {}", e)))?;
    normalize_payload(&value)
}

/// Normalize an already-decoded payload.
///
/// A JSON string holding an encoded array is decoded once more; stored
/// transcripts have been seen double-encoded.
pub fn normalize_payload(payload: &Value) -> Result<Vec<TranscriptSegment>> {
    let decoded;
    let value = match payload {
        Value::String(s) => {
            decoded = serde_json::from_str::<Value>(s).map_err(|e| {
                WizardError::InvalidTranscript(format!(
                    "payload is a string that does not decode as JSON: {}",
                    e
                ))
            })?;
            &decoded
        }
        other => other,
    };

    let items = value.as_array().ok_or_else(|| {
        WizardError::InvalidTranscript(format!(
            "expected an array of segments, found {}",
            json_kind(value)
        ))
    })?;

    if items.is_empty() {
        return Err(WizardError::EmptyTranscript);
    }

    let mut segments = Vec::with_capacity(items.len());
    let mut previous_offset: Option<u64> = None;

    for (index, item) in items.iter().enumerate() {
        let obj = item.as_object().ok_or_else(|| {
            malformed(index, format!("expected an object, found {}", json_kind(item)))
        })?;

        let text = match obj.get(TEXT_KEY) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(malformed(
                    index,
                    format!("text must be a string, found {}", json_kind(other)),
                ))
            }
            None => return Err(malformed(index, "missing text")),
        };

        let offset = millis_field(obj, OFFSET_KEYS).map_err(|reason| malformed(index, reason))?;
        let duration =
            millis_field(obj, DURATION_KEYS).map_err(|reason| malformed(index, reason))?;

        if duration <= 0.0 {
            return Err(malformed(index, "durationMs must be greater than zero"));
        }

        let offset_ms = offset.round() as u64;
        // Sub-millisecond durations still count as positive.
        let duration_ms = (duration.round() as u64).max(1);

        if let Some(prev) = previous_offset {
            if offset_ms < prev {
                return Err(malformed(
                    index,
                    format!("offsetMs {} precedes previous segment at {}", offset_ms, prev),
                ));
            }
        }
        previous_offset = Some(offset_ms);

        segments.push(TranscriptSegment {
            text,
            offset_ms,
            duration_ms,
        });
    }

    Ok(segments)
}

fn malformed(index: usize, reason: impl Into<String>) -> WizardError {
    WizardError::MalformedSegment {
        index,
        reason: reason.into(),
    }
}

/// Read the first present key of `keys` as a non-negative millisecond count.
fn millis_field(obj: &Map<String, Value>, keys: &[&str]) -> std::result::Result<f64, String> {
    let (key, value) = keys
        .iter()
        .find_map(|k| obj.get(*k).map(|v| (*k, v)))
        .ok_or_else(|| format!("missing {}", keys[0]))?;

    let millis = match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("{} is not a representable number", key))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("{} is not numeric: {:?}", key, s))?,
        other => return Err(format!("{} must be numeric, found {}", key, json_kind(other))),
    };

    if !millis.is_finite() {
        return Err(format!("{} is not finite", key));
    }
    if millis < 0.0 {
        return Err(format!("{} must not be negative", key));
    }
    Ok(millis)
}

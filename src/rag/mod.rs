//! RAG (Retrieval-Augmented Generation) for question answering with sources.
//!
//! Provides the ability to ask questions and get answers from the video knowledge base.

pub mod context;
mod engine;
mod synthesizer;

pub use context::{format_context_for_prompt, format_references_for_display, VideoLinks};
pub use engine::RagEngine;
pub use synthesizer::{
    confidence_from_score, suggest_questions, AnswerSynthesizer, ExtractiveSynthesizer,
    OpenAISynthesizer, SynthesizedAnswer,
};

use serde::{Deserialize, Serialize};

/// Answer shown when a question cannot be answered because of an internal failure.
pub const FALLBACK_ANSWER: &str =
    "Sorry, I'm having trouble answering right now. Please try again in a moment.";

/// Answer given when nothing in the library matches the question.
pub const NO_RESULTS_ANSWER: &str = "I couldn't find any relevant content in the tutorial library for this question. Try rephrasing it, or ask about a specific Roblox topic like scripting, Studio, GUIs or TweenService.";

/// A clickable reference to a moment in a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoReference {
    pub title: String,
    pub creator: String,
    pub video_external_id: String,
    /// Start of the matched chunk, truncated to whole seconds.
    pub start_seconds: u32,
    pub url: String,
    pub timestamp_url: String,
    pub matched_excerpt: String,
    pub similarity_score: f32,
}

/// A question to answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub question: String,
    /// Chunks to retrieve; configured default when unset.
    #[serde(default)]
    pub max_results: Option<usize>,
    /// Minimum similarity; configured default when unset.
    #[serde(default)]
    pub similarity_threshold: Option<f32>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            max_results: None,
            similarity_threshold: None,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }
}

/// An answer with its sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub answer: String,
    pub video_references: Vec<VideoReference>,
    pub suggested_questions: Vec<String>,
    pub confidence: f32,
    pub cache_hit: bool,
}

impl QueryResponse {
    /// The polite response served in place of an error.
    pub fn fallback() -> Self {
        Self {
            answer: FALLBACK_ANSWER.to_string(),
            video_references: Vec::new(),
            suggested_questions: synthesizer::GENERIC_SUGGESTIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            confidence: 0.0,
            cache_hit: false,
        }
    }

    /// Format the response for display.
    pub fn format_for_display(&self) -> String {
        let mut output = self.answer.clone();

        if !self.video_references.is_empty() {
            output.push_str("\n\n--- Sources ---\n\n");
            output.push_str(&format_references_for_display(&self.video_references));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_from_json() {
        let req: QueryRequest = serde_json::from_str(r#"{"question": "How do I tween?"}"#).unwrap();
        assert!(req.max_results.is_none());
        assert!(req.similarity_threshold.is_none());

        let req: QueryRequest = serde_json::from_str(
            r#"{"question": "q", "maxResults": 3, "similarityThreshold": 0.01}"#,
        )
        .unwrap();
        assert_eq!(req.max_results, Some(3));
        assert_eq!(req.similarity_threshold, Some(0.01));
    }

    #[test]
    fn test_response_wire_format() {
        let json = serde_json::to_value(QueryResponse::fallback()).unwrap();
        assert!(json.get("videoReferences").is_some());
        assert!(json.get("suggestedQuestions").is_some());
        assert_eq!(json["cacheHit"], false);
        assert_eq!(json["confidence"], 0.0);
    }
}

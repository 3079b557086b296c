//! Context building for RAG responses: video links, references and prompt context.

use super::VideoReference;
use crate::error::{Result, WizardError};
use crate::transcript::format_timestamp;
use crate::vector_store::SearchResult;
use std::collections::HashSet;
use url::Url;

/// Longest excerpt attached to a reference, in characters.
const EXCERPT_CHARS: usize = 200;

/// Builds watch and timestamp links for videos on the hosting platform.
#[derive(Debug, Clone)]
pub struct VideoLinks {
    base: Url,
}

impl VideoLinks {
    pub fn new(watch_base_url: &str) -> Result<Self> {
        let base = Url::parse(watch_base_url)
            .map_err(|e| WizardError::Config(format!("Invalid watch URL {}: {}", watch_base_url, e)))?;
        Ok(Self { base })
    }

    /// Direct link to a video.
    pub fn watch_url(&self, external_id: &str) -> String {
        let mut url = self.base.clone();
        url.query_pairs_mut().append_pair("v", external_id);
        url.into()
    }

    /// Link that starts playback at `seconds`.
    pub fn timestamp_url(&self, external_id: &str, seconds: u32) -> String {
        let mut url = self.base.clone();
        url.query_pairs_mut()
            .append_pair("v", external_id)
            .append_pair("t", &format!("{}s", seconds));
        url.into()
    }

    /// One reference per distinct video, taken from its best-scoring result.
    ///
    /// `results` must be ranked best first; reference order follows it.
    pub fn references(&self, results: &[SearchResult]) -> Vec<VideoReference> {
        let mut seen = HashSet::new();
        results
            .iter()
            .filter(|r| seen.insert(r.video_id()))
            .map(|r| {
                let start_seconds = r.chunk.start_seconds.max(0.0) as u32;
                VideoReference {
                    title: r.title.clone(),
                    creator: r.creator.clone(),
                    video_external_id: r.external_id.clone(),
                    start_seconds,
                    url: self.watch_url(&r.external_id),
                    timestamp_url: self.timestamp_url(&r.external_id, start_seconds),
                    matched_excerpt: excerpt(&r.chunk.text),
                    similarity_score: r.similarity_score,
                }
            })
            .collect()
    }
}

/// Shorten text to the excerpt length on a character boundary.
fn excerpt(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(EXCERPT_CHARS).collect();
    format!("{}...", cut.trim_end())
}

/// Format search results as numbered excerpts for a prompt.
pub fn format_context_for_prompt(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "---\n[{}] {} @ {}\n{}\n---",
                i + 1,
                r.title,
                r.format_timestamp(),
                r.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Format references for display to the user.
pub fn format_references_for_display(references: &[VideoReference]) -> String {
    references
        .iter()
        .map(|r| {
            format!(
                "{} by {} @ {} (score: {:.2})\n  Link: {}",
                r.title,
                r.creator,
                format_timestamp(f64::from(r.start_seconds)),
                r.similarity_score,
                r.timestamp_url
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

//! Answer synthesis from ranked search results.
//!
//! References, confidence and suggested questions are always computed
//! deterministically; synthesizers differ only in how the answer text is composed.

use super::context::{format_context_for_prompt, VideoLinks};
use super::{VideoReference, NO_RESULTS_ANSWER};
use crate::config::Prompts;
use crate::error::{Result, WizardError};
use crate::openai::create_client;
use crate::transcript::format_timestamp;
use crate::vector_store::SearchResult;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument, warn};

/// Suggestions offered when nothing more specific applies.
pub(crate) const GENERIC_SUGGESTIONS: &[&str] = &[
    "How do I get started with Roblox scripting?",
    "What are the basics of Roblox Studio?",
    "How do I create my first game?",
    "Show me how to make a simple obby",
];

/// Follow-up questions by topic keyword.
const TOPIC_SUGGESTIONS: &[(&[&str], &[&str])] = &[
    (
        &["tween", "tweenservice", "animation", "animate"],
        &[
            "What are the different easing styles?",
            "Can I animate GUI elements with TweenService?",
            "How do I create complex animation sequences?",
        ],
    ),
    (
        &["teleport", "teleportservice", "cframe"],
        &[
            "How do I teleport between different games?",
            "What's the difference between CFrame and TeleportService?",
            "How do I create a teleport GUI?",
        ],
    ),
    (
        &["gui", "ui", "screengui", "button", "frame"],
        &[
            "How do I make a GUI that follows the player?",
            "What's the best way to create responsive UIs?",
            "Can you show me how to make a shop interface?",
        ],
    ),
    (
        &["studio", "explorer", "properties", "workspace", "terrain"],
        &[
            "How do I customize my Studio workspace?",
            "Where can I find the terrain tools?",
            "How do I use the animation editor?",
        ],
    ),
    (
        &["script", "scripting", "lua", "luau", "code", "localscript", "function", "variable"],
        &[
            "How do I create my first script?",
            "What's the difference between ServerScript and LocalScript?",
            "How do I handle player events in Lua?",
        ],
    ),
    (
        &["datastore", "save", "leaderboard", "leaderstats"],
        &[
            "How do I save player data with DataStores?",
            "How do I make a leaderboard?",
        ],
    ),
];

const MAX_SUGGESTIONS: usize = 4;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "your", "all", "can", "how", "what", "when",
    "where", "why", "who", "does", "did", "this", "that", "with", "from", "into", "make", "about",
    "there", "their", "have", "has", "was", "were", "will", "would", "should", "could", "i'm",
    "get", "use", "using",
];

/// Answer text plus its deterministic annotations.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAnswer {
    pub answer: String,
    pub video_references: Vec<VideoReference>,
    pub suggested_questions: Vec<String>,
    pub confidence: f32,
}

/// Trait for answer synthesizers.
#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    /// Compose an answer from results ranked best first. Empty results are not an error.
    async fn synthesize(&self, question: &str, results: &[SearchResult])
        -> Result<SynthesizedAnswer>;
}

/// Map the top similarity score into `[0, 1]`. No results means zero confidence.
pub fn confidence_from_score(top_score: Option<f32>) -> f32 {
    match top_score {
        None => 0.0,
        Some(s) if !s.is_finite() => 0.0,
        Some(s) if s >= 0.9 => 1.0,
        Some(s) if s >= 0.8 => 0.9,
        Some(s) if s >= 0.7 => 0.8,
        Some(s) if s >= 0.6 => 0.7,
        Some(s) => s.clamp(0.0, 1.0),
    }
}

/// Significant lowercase words of a text.
fn keywords(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| w.len() > 2 && !STOPWORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Two to four follow-up questions, distinct and different from `question`.
pub fn suggest_questions(question: &str, results: &[SearchResult]) -> Vec<String> {
    let asked = crate::cache::normalize_question(question);
    let mut haystack: HashSet<String> = keywords(question);
    for r in results.iter().take(3) {
        haystack.extend(keywords(&r.title));
    }

    let topical = TOPIC_SUGGESTIONS
        .iter()
        .filter(|(keys, _)| keys.iter().any(|k| haystack.contains(*k)))
        .flat_map(|(_, questions)| questions.iter().map(|q| q.to_string()));

    let from_video = results
        .first()
        .map(|r| format!("What else does \"{}\" cover?", r.title));

    let generic = GENERIC_SUGGESTIONS.iter().map(|q| q.to_string());

    let mut seen = HashSet::new();
    seen.insert(asked);
    topical
        .chain(from_video)
        .chain(generic)
        .filter(|q| !q.trim().is_empty())
        .filter(|q| seen.insert(crate::cache::normalize_question(q)))
        .take(MAX_SUGGESTIONS)
        .collect()
}

/// Composes answers from the best-matching sentences of the retrieved chunks.
pub struct ExtractiveSynthesizer {
    links: VideoLinks,
    max_sentences: usize,
    sentence: Regex,
}

impl ExtractiveSynthesizer {
    pub fn new(links: VideoLinks, max_sentences: usize) -> Result<Self> {
        let sentence = Regex::new(r"[^.!?]+[.!?]*")
            .map_err(|e| WizardError::Synthesis(format!("Invalid sentence pattern: {}", e)))?;
        Ok(Self {
            links,
            max_sentences: max_sentences.max(1),
            sentence,
        })
    }

    /// Select sentences overlapping the question, in reading order.
    fn select_sentences(&self, question: &str, results: &[SearchResult]) -> Vec<String> {
        let wanted = keywords(question);

        // (overlap, result rank, position, sentence)
        let mut candidates: Vec<(usize, usize, usize, String)> = Vec::new();
        let mut seen = HashSet::new();
        for (rank, r) in results.iter().enumerate() {
            for (pos, m) in self.sentence.find_iter(&r.chunk.text).enumerate() {
                let sentence = m.as_str().trim();
                if sentence.is_empty() || !seen.insert(sentence.to_lowercase()) {
                    continue;
                }
                let overlap = keywords(sentence).intersection(&wanted).count();
                candidates.push((overlap, rank, pos, sentence.to_string()));
            }
        }

        let mut picked: Vec<_> = candidates.iter().filter(|c| c.0 > 0).cloned().collect();
        if picked.is_empty() {
            picked = candidates.into_iter().take(1).collect();
        }

        picked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
        picked.truncate(self.max_sentences);
        picked.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)));
        picked.into_iter().map(|c| capitalize(&c.3)).collect()
    }

    fn compose(&self, question: &str, results: &[SearchResult], refs: &[VideoReference]) -> String {
        let body = self.select_sentences(question, results).join(" ");
        match refs.first() {
            Some(top) => format!(
                "Here's what the tutorials say:\n\n{}\n\nFor a walkthrough, watch \"{}\" by {} starting at {}.",
                body,
                top.title,
                top.creator,
                format_timestamp(f64::from(top.start_seconds))
            ),
            None => body,
        }
    }

    fn annotate(&self, question: &str, results: &[SearchResult]) -> SynthesizedAnswer {
        SynthesizedAnswer {
            answer: String::new(),
            video_references: self.links.references(results),
            suggested_questions: suggest_questions(question, results),
            confidence: confidence_from_score(results.first().map(|r| r.similarity_score)),
        }
    }
}

fn capitalize(sentence: &str) -> String {
    let mut chars = sentence.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[async_trait]
impl AnswerSynthesizer for ExtractiveSynthesizer {
    #[instrument(skip(self, results), fields(results = results.len()))]
    async fn synthesize(
        &self,
        question: &str,
        results: &[SearchResult],
    ) -> Result<SynthesizedAnswer> {
        let mut answer = self.annotate(question, results);
        answer.answer = if results.is_empty() {
            NO_RESULTS_ANSWER.to_string()
        } else {
            self.compose(question, results, &answer.video_references)
        };
        debug!(
            "Synthesized answer with {} references",
            answer.video_references.len()
        );
        Ok(answer)
    }
}

/// Asks a chat model to write the answer text from the retrieved excerpts.
///
/// Falls back to the extractive text when the model call fails.
pub struct OpenAISynthesizer {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    temperature: f32,
    prompts: Prompts,
    extractive: ExtractiveSynthesizer,
}

impl OpenAISynthesizer {
    pub fn new(
        model: &str,
        temperature: f32,
        prompts: Prompts,
        extractive: ExtractiveSynthesizer,
    ) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            model: model.to_string(),
            temperature,
            prompts,
            extractive,
        })
    }

    async fn generate(&self, question: &str, results: &[SearchResult]) -> Result<String> {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), question.to_string());
        vars.insert("context".to_string(), format_context_for_prompt(results));

        let user_prompt = self
            .prompts
            .render_with_custom(&self.prompts.answer.user, &vars);
        let system_prompt = self
            .prompts
            .render_with_custom(&self.prompts.answer.system, &vars);

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt)
                .build()
                .map_err(|e| WizardError::Synthesis(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_prompt)
                .build()
                .map_err(|e| WizardError::Synthesis(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .build()
            .map_err(|e| WizardError::Synthesis(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| WizardError::OpenAI(format!("Failed to generate answer: {}", e)))?;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| WizardError::Synthesis("Empty response from LLM".to_string()))
    }
}

#[async_trait]
impl AnswerSynthesizer for OpenAISynthesizer {
    #[instrument(skip(self, results), fields(results = results.len()))]
    async fn synthesize(
        &self,
        question: &str,
        results: &[SearchResult],
    ) -> Result<SynthesizedAnswer> {
        let mut answer = self.extractive.synthesize(question, results).await?;
        if results.is_empty() {
            return Ok(answer);
        }

        match self.generate(question, results).await {
            Ok(text) => answer.answer = text,
            Err(e) => warn!("Falling back to extractive answer: {}", e),
        }
        Ok(answer)
    }
}

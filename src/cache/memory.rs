//! In-memory question cache.

use super::{check_ownership, CacheEntry, CacheStats, CacheStore, CachedAnswer, CachedQuestion};
use crate::error::{Result, WizardError};
use crate::vector_store::cosine_similarity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct State {
    entries: HashMap<String, CacheEntry>,
    generation: u64,
}

impl State {
    fn insert(&mut self, mut question: CachedQuestion, answer: CachedAnswer) {
        if let Some(existing) = self.entries.get(&question.normalized_pattern) {
            question.created_at = existing.question.created_at;
            question.usage_count = existing.question.usage_count.saturating_add(1);
        }
        self.entries.insert(
            question.normalized_pattern.clone(),
            CacheEntry { question, answer },
        );
    }
}

/// In-memory cache store.
pub struct MemoryCacheStore {
    state: RwLock<State>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|e| WizardError::Cache(format!("Failed to acquire lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|e| WizardError::Cache(format!("Failed to acquire lock: {}", e)))
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, pattern: &str) -> Result<Option<CacheEntry>> {
        Ok(self.read()?.entries.get(pattern).cloned())
    }

    async fn generation(&self) -> Result<u64> {
        Ok(self.read()?.generation)
    }

    async fn put(&self, question: CachedQuestion, answer: CachedAnswer) -> Result<()> {
        check_ownership(&question, &answer)?;
        self.write()?.insert(question, answer);
        Ok(())
    }

    async fn put_if_current(
        &self,
        question: CachedQuestion,
        answer: CachedAnswer,
        generation: u64,
    ) -> Result<bool> {
        check_ownership(&question, &answer)?;
        let mut state = self.write()?;
        if state.generation != generation {
            return Ok(false);
        }
        state.insert(question, answer);
        Ok(true)
    }

    async fn touch(&self, pattern: &str, now: DateTime<Utc>) -> Result<Option<u32>> {
        let mut state = self.write()?;
        Ok(state.entries.get_mut(pattern).map(|entry| {
            entry.question.usage_count = entry.question.usage_count.saturating_add(1);
            entry.question.last_used_at = now;
            entry.question.usage_count
        }))
    }

    async fn evict(&self, pattern: &str) -> Result<bool> {
        Ok(self.write()?.entries.remove(pattern).is_some())
    }

    async fn find_similar(
        &self,
        embedding: &[f32],
        threshold: f32,
        now: DateTime<Utc>,
    ) -> Result<Option<(CacheEntry, f32)>> {
        let state = self.read()?;
        let best = state
            .entries
            .values()
            .filter(|entry| !entry.answer.is_expired(now))
            .filter_map(|entry| {
                let candidate = entry.question.embedding.as_deref()?;
                (candidate.len() == embedding.len())
                    .then(|| (entry, cosine_similarity(embedding, candidate)))
            })
            .filter(|(_, score)| *score >= threshold)
            .max_by(|a, b| {
                a.1.total_cmp(&b.1).then_with(|| {
                    b.0.question
                        .normalized_pattern
                        .cmp(&a.0.question.normalized_pattern)
                })
            });

        Ok(best.map(|(entry, score)| (entry.clone(), score)))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut state = self.write()?;
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.answer.is_expired(now));
        Ok(before - state.entries.len())
    }

    async fn clear(&self) -> Result<usize> {
        let mut state = self.write()?;
        let count = state.entries.len();
        state.entries.clear();
        state.generation = state.generation.wrapping_add(1);
        Ok(count)
    }

    async fn stats(&self, now: DateTime<Utc>) -> Result<CacheStats> {
        let state = self.read()?;
        let entries = &state.entries;
        Ok(CacheStats {
            questions: entries.len(),
            expired: entries
                .values()
                .filter(|e| e.answer.is_expired(now))
                .count(),
            total_usage: entries
                .values()
                .map(|e| u64::from(e.question.usage_count))
                .sum(),
        })
    }
}

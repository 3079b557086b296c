//! SQLite-backed question cache.

use super::{check_ownership, CacheEntry, CacheStats, CacheStore, CachedAnswer, CachedQuestion};
use crate::error::{Result, WizardError};
use crate::vector_store::cosine_similarity;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS cached_questions (
        normalized_pattern TEXT PRIMARY KEY,
        embedding BLOB,
        usage_count INTEGER NOT NULL DEFAULT 1,
        last_used_at TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS cached_answers (
        question_pattern TEXT PRIMARY KEY
            REFERENCES cached_questions(normalized_pattern) ON DELETE CASCADE,
        answer_text TEXT NOT NULL,
        video_references TEXT NOT NULL,
        suggested_questions TEXT NOT NULL,
        confidence_score REAL NOT NULL,
        generated_at TEXT NOT NULL,
        expires_at TEXT
    );

    CREATE TABLE IF NOT EXISTS cache_meta (
        key TEXT PRIMARY KEY,
        value INTEGER NOT NULL
    );

    INSERT OR IGNORE INTO cache_meta (key, value) VALUES ('generation', 0);
"#;

const READ_GENERATION: &str = "SELECT value FROM cache_meta WHERE key = 'generation'";

const ENTRY_SELECT: &str = r#"
    SELECT q.normalized_pattern, q.embedding, q.usage_count, q.last_used_at, q.created_at,
           a.answer_text, a.video_references, a.suggested_questions, a.confidence_score,
           a.generated_at, a.expires_at
    FROM cached_questions q
    JOIN cached_answers a ON a.question_pattern = q.normalized_pattern
"#;

/// SQLite cache store. Shares the database file with the vector store.
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
}

/// Raw row before JSON columns are decoded.
struct EntryRow {
    question: CachedQuestion,
    answer_text: String,
    video_references: String,
    suggested_questions: String,
    confidence_score: f64,
    generated_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl EntryRow {
    fn into_entry(self) -> Result<CacheEntry> {
        Ok(CacheEntry {
            answer: CachedAnswer {
                question_pattern: self.question.normalized_pattern.clone(),
                answer_text: self.answer_text,
                video_references: serde_json::from_str(&self.video_references)?,
                suggested_questions: serde_json::from_str(&self.suggested_questions)?,
                confidence_score: self.confidence_score as f32,
                generated_at: self.generated_at,
                expires_at: self.expires_at,
            },
            question: self.question,
        })
    }
}

fn parse_time(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Fixed-width UTC timestamps so stored values compare correctly as text.
fn stamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

impl SqliteCacheStore {
    /// Open (or create) the cache tables in the database at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        info!("Initialized SQLite question cache");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| WizardError::Cache(format!("Failed to acquire lock: {}", e)))
    }

    /// Upsert the question and replace its answer inside `tx`.
    fn write_entry(tx: &Transaction<'_>, question: &CachedQuestion, answer: &CachedAnswer) -> Result<()> {
        let references = serde_json::to_string(&answer.video_references)?;
        let suggestions = serde_json::to_string(&answer.suggested_questions)?;

        tx.execute(
            r#"
            INSERT INTO cached_questions
            (normalized_pattern, embedding, usage_count, last_used_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(normalized_pattern) DO UPDATE SET
                embedding = excluded.embedding,
                usage_count = cached_questions.usage_count + 1,
                last_used_at = excluded.last_used_at
            "#,
            params![
                question.normalized_pattern,
                question.embedding.as_deref().map(embedding_to_bytes),
                question.usage_count,
                stamp(question.last_used_at),
                stamp(question.created_at),
            ],
        )?;

        tx.execute(
            r#"
            INSERT OR REPLACE INTO cached_answers
            (question_pattern, answer_text, video_references, suggested_questions,
             confidence_score, generated_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                answer.question_pattern,
                answer.answer_text,
                references,
                suggestions,
                answer.confidence_score as f64,
                stamp(answer.generated_at),
                answer.expires_at.map(stamp),
            ],
        )?;
        Ok(())
    }

    fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<EntryRow> {
        let embedding: Option<Vec<u8>> = row.get(1)?;
        let last_used_at: String = row.get(3)?;
        let created_at: String = row.get(4)?;
        let generated_at: String = row.get(9)?;
        let expires_at: Option<String> = row.get(10)?;

        Ok(EntryRow {
            question: CachedQuestion {
                normalized_pattern: row.get(0)?,
                embedding: embedding.as_deref().and_then(bytes_to_embedding),
                usage_count: row.get(2)?,
                last_used_at: parse_time(&last_used_at),
                created_at: parse_time(&created_at),
            },
            answer_text: row.get(5)?,
            video_references: row.get(6)?,
            suggested_questions: row.get(7)?,
            confidence_score: row.get(8)?,
            generated_at: parse_time(&generated_at),
            expires_at: expires_at.as_deref().map(parse_time),
        })
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, pattern: &str) -> Result<Option<CacheEntry>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("{} WHERE q.normalized_pattern = ?1", ENTRY_SELECT),
                params![pattern],
                Self::row_to_entry,
            )
            .optional()?;
        row.map(EntryRow::into_entry).transpose()
    }

    #[instrument(skip_all, fields(pattern = %question.normalized_pattern))]
    async fn put(&self, question: CachedQuestion, answer: CachedAnswer) -> Result<()> {
        check_ownership(&question, &answer)?;
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        Self::write_entry(&tx, &question, &answer)?;
        tx.commit()?;
        debug!("Cached answer");
        Ok(())
    }

    async fn generation(&self) -> Result<u64> {
        let conn = self.conn()?;
        let generation: i64 = conn.query_row(READ_GENERATION, [], |row| row.get(0))?;
        Ok(generation as u64)
    }

    #[instrument(skip_all, fields(pattern = %question.normalized_pattern))]
    async fn put_if_current(
        &self,
        question: CachedQuestion,
        answer: CachedAnswer,
        generation: u64,
    ) -> Result<bool> {
        check_ownership(&question, &answer)?;
        let mut conn = self.conn()?;
        // Immediate: other processes sharing the file cannot clear in between.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: i64 = tx.query_row(READ_GENERATION, [], |row| row.get(0))?;
        if current as u64 != generation {
            debug!("Cache cleared since the answer was computed; not storing");
            return Ok(false);
        }

        Self::write_entry(&tx, &question, &answer)?;
        tx.commit()?;
        debug!("Cached answer");
        Ok(true)
    }

    async fn touch(&self, pattern: &str, now: DateTime<Utc>) -> Result<Option<u32>> {
        let conn = self.conn()?;
        let count = conn
            .query_row(
                r#"
                UPDATE cached_questions
                SET usage_count = usage_count + 1, last_used_at = ?2
                WHERE normalized_pattern = ?1
                RETURNING usage_count
                "#,
                params![pattern, stamp(now)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count)
    }

    async fn evict(&self, pattern: &str) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM cached_questions WHERE normalized_pattern = ?1",
            params![pattern],
        )?;
        Ok(removed > 0)
    }

    async fn find_similar(
        &self,
        embedding: &[f32],
        threshold: f32,
        now: DateTime<Utc>,
    ) -> Result<Option<(CacheEntry, f32)>> {
        let rows = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&format!(
                "{} WHERE q.embedding IS NOT NULL AND (a.expires_at IS NULL OR a.expires_at > ?1)",
                ENTRY_SELECT
            ))?;
            let rows = stmt
                .query_map(params![stamp(now)], Self::row_to_entry)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let best = rows
            .into_iter()
            .filter_map(|row| {
                let candidate = row.question.embedding.as_deref()?;
                if candidate.len() != embedding.len() {
                    return None;
                }
                let score = cosine_similarity(embedding, candidate);
                (score >= threshold).then_some((row, score))
            })
            .max_by(|a, b| {
                a.1.total_cmp(&b.1).then_with(|| {
                    b.0.question
                        .normalized_pattern
                        .cmp(&a.0.question.normalized_pattern)
                })
            });

        match best {
            Some((row, score)) => Ok(Some((row.into_entry()?, score))),
            None => Ok(None),
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            r#"
            DELETE FROM cached_questions WHERE normalized_pattern IN (
                SELECT question_pattern FROM cached_answers
                WHERE expires_at IS NOT NULL AND expires_at <= ?1
            )
            "#,
            params![stamp(now)],
        )?;
        info!("Purged {} expired cache entries", removed);
        Ok(removed)
    }

    async fn clear(&self) -> Result<usize> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM cached_answers", [])?;
        let removed = tx.execute("DELETE FROM cached_questions", [])?;
        tx.execute(
            "UPDATE cache_meta SET value = value + 1 WHERE key = 'generation'",
            [],
        )?;
        tx.commit()?;
        Ok(removed)
    }

    async fn stats(&self, now: DateTime<Utc>) -> Result<CacheStats> {
        let conn = self.conn()?;
        let (questions, total_usage): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(usage_count), 0) FROM cached_questions",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let expired: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cached_answers WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![stamp(now)],
            |row| row.get(0),
        )?;

        Ok(CacheStats {
            questions: questions as usize,
            expired: expired as usize,
            total_usage: total_usage as u64,
        })
    }
}

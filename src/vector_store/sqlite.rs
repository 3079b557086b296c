//! SQLite-based vector store implementation.
//!
//! Uses SQLite with cosine similarity computed in Rust for simplicity.
//! Embeddings are stored as little-endian f32 BLOBs; a NULL embedding marks a
//! chunk that still needs embedding.

use super::{
    listing_order, rank, IndexStats, IndexedVideo, SearchResult, StoredTranscript, VectorStore,
};
use crate::chunking::TranscriptChunk;
use crate::error::{Result, WizardError};
use crate::transcript::{VideoMetadata, VideoTranscript};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS video_transcripts (
        video_id TEXT PRIMARY KEY,
        external_id TEXT NOT NULL,
        title TEXT NOT NULL,
        creator TEXT NOT NULL,
        duration_seconds REAL NOT NULL,
        transcript_json TEXT,
        processed_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS transcript_chunks (
        transcript_id TEXT NOT NULL
            REFERENCES video_transcripts(video_id) ON DELETE CASCADE,
        chunk_index INTEGER NOT NULL,
        chunk_text TEXT NOT NULL,
        start_seconds REAL NOT NULL,
        end_seconds REAL NOT NULL,
        embedding BLOB,
        PRIMARY KEY (transcript_id, chunk_index)
    );

    CREATE INDEX IF NOT EXISTS idx_chunks_missing_embedding
        ON transcript_chunks(transcript_id) WHERE embedding IS NULL;
"#;

const CHUNK_COLUMNS: &str =
    "c.transcript_id, c.chunk_index, c.chunk_text, c.start_seconds, c.end_seconds, c.embedding";

const VIDEO_SUMMARY: &str = r#"
    SELECT v.video_id, v.external_id, v.title, v.creator, v.duration_seconds, v.processed_at,
           COUNT(c.chunk_index), COUNT(c.embedding)
    FROM video_transcripts v
    LEFT JOIN transcript_chunks c ON c.transcript_id = v.video_id
"#;

/// SQLite-based vector store.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
}

impl SqliteVectorStore {
    /// Open (or create) a store at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn, &format!("{:?}", path))
    }

    /// Create an in-memory SQLite vector store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, "memory")
    }

    fn init(conn: Connection, location: &str) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        info!("Initialized SQLite vector store at {}", location);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| WizardError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }

    /// Serialize embedding to bytes.
    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize embedding from bytes. `None` if the BLOB is truncated.
    fn bytes_to_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
        if bytes.len() % 4 != 0 {
            return None;
        }
        Some(
            bytes
                .chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect(),
        )
    }

    /// Map a row selected with [`CHUNK_COLUMNS`] starting at `offset`.
    fn row_to_chunk(row: &Row<'_>, offset: usize) -> rusqlite::Result<TranscriptChunk> {
        let transcript_id: String = row.get(offset)?;
        let chunk_index: u32 = row.get(offset + 1)?;
        let bytes: Option<Vec<u8>> = row.get(offset + 5)?;
        let embedding = match bytes {
            Some(b) => {
                let decoded = Self::bytes_to_embedding(&b);
                if decoded.is_none() {
                    warn!(
                        video_id = %transcript_id,
                        chunk_index,
                        "Ignoring truncated embedding of {} bytes",
                        b.len()
                    );
                }
                decoded
            }
            None => None,
        };

        Ok(TranscriptChunk {
            chunk_index,
            transcript_id,
            text: row.get(offset + 2)?,
            start_seconds: row.get(offset + 3)?,
            end_seconds: row.get(offset + 4)?,
            embedding,
        })
    }

    fn row_to_metadata(row: &Row<'_>, offset: usize) -> rusqlite::Result<VideoMetadata> {
        Ok(VideoMetadata {
            video_id: row.get(offset)?,
            external_id: row.get(offset + 1)?,
            title: row.get(offset + 2)?,
            creator: row.get(offset + 3)?,
            duration_seconds: row.get(offset + 4)?,
        })
    }

    fn row_to_summary(row: &Row<'_>) -> rusqlite::Result<IndexedVideo> {
        let processed_at: String = row.get(5)?;
        Ok(IndexedVideo {
            metadata: Self::row_to_metadata(row, 0)?,
            indexed_at: DateTime::parse_from_rfc3339(&processed_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            chunk_count: row.get(6)?,
            embedded_count: row.get(7)?,
        })
    }

    fn row_to_stored(row: &Row<'_>) -> rusqlite::Result<StoredTranscript> {
        Ok(StoredTranscript {
            metadata: Self::row_to_metadata(row, 0)?,
            payload: row.get(5)?,
        })
    }

    fn search_blocking(
        &self,
        query_embedding: &[f32],
        limit: usize,
        min_score: f32,
        max_per_video: Option<usize>,
    ) -> Result<Vec<SearchResult>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT v.video_id, v.external_id, v.title, v.creator, v.duration_seconds, {}
            FROM transcript_chunks c
            JOIN video_transcripts v ON v.video_id = c.transcript_id
            WHERE c.embedding IS NOT NULL
            "#,
            CHUNK_COLUMNS
        ))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((Self::row_to_chunk(row, 5)?, Self::row_to_metadata(row, 0)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let results = rank(
            query_embedding,
            rows.iter().map(|(chunk, video)| (chunk, video)),
            limit,
            min_score,
            max_per_video,
        );
        debug!("Found {} matching chunks", results.len());
        Ok(results)
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    #[instrument(skip(self, transcript, chunks), fields(video_id = %transcript.video_id()))]
    async fn replace_transcript(
        &self,
        transcript: &VideoTranscript,
        chunks: &[TranscriptChunk],
    ) -> Result<()> {
        let payload = serde_json::to_string(&transcript.segments)?;
        let meta = &transcript.metadata;

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            "DELETE FROM transcript_chunks WHERE transcript_id = ?1",
            params![meta.video_id],
        )?;

        tx.execute(
            r#"
            INSERT INTO video_transcripts
            (video_id, external_id, title, creator, duration_seconds, transcript_json, processed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(video_id) DO UPDATE SET
                external_id = excluded.external_id,
                title = excluded.title,
                creator = excluded.creator,
                duration_seconds = excluded.duration_seconds,
                transcript_json = excluded.transcript_json,
                processed_at = excluded.processed_at
            "#,
            params![
                meta.video_id,
                meta.external_id,
                meta.title,
                meta.creator,
                meta.duration_seconds,
                payload,
                Utc::now().to_rfc3339(),
            ],
        )?;

        {
            let mut insert = tx.prepare(
                r#"
                INSERT INTO transcript_chunks
                (transcript_id, chunk_index, chunk_text, start_seconds, end_seconds, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;

            for chunk in chunks {
                insert.execute(params![
                    meta.video_id,
                    chunk.chunk_index,
                    chunk.text,
                    chunk.start_seconds,
                    chunk.end_seconds,
                    chunk.embedding.as_deref().map(Self::embedding_to_bytes),
                ])?;
            }
        }

        tx.commit()?;
        info!("Stored transcript with {} chunks", chunks.len());
        Ok(())
    }

    #[instrument(skip(self, embedding))]
    async fn set_embedding(
        &self,
        transcript_id: &str,
        chunk_index: u32,
        embedding: Vec<f32>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE transcript_chunks SET embedding = ?1 WHERE transcript_id = ?2 AND chunk_index = ?3",
            params![Self::embedding_to_bytes(&embedding), transcript_id, chunk_index],
        )?;

        if updated == 0 {
            return Err(WizardError::VectorStore(format!(
                "No chunk {} for video {}",
                chunk_index, transcript_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, query_embedding))]
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        min_score: f32,
        max_per_video: Option<usize>,
    ) -> Result<Vec<SearchResult>> {
        self.search_blocking(query_embedding, limit, min_score, max_per_video)
            .map_err(|e| match e {
                WizardError::SearchUnavailable(_) => e,
                other => WizardError::SearchUnavailable(other.to_string()),
            })
    }

    #[instrument(skip(self))]
    async fn delete_transcript(&self, video_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let chunks = tx.execute(
            "DELETE FROM transcript_chunks WHERE transcript_id = ?1",
            params![video_id],
        )?;
        let videos = tx.execute(
            "DELETE FROM video_transcripts WHERE video_id = ?1",
            params![video_id],
        )?;
        tx.commit()?;

        info!("Deleted video {} ({} chunks)", video_id, chunks);
        Ok(videos > 0)
    }

    #[instrument(skip(self))]
    async fn list_videos(&self) -> Result<Vec<IndexedVideo>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{} GROUP BY v.video_id", VIDEO_SUMMARY))?;

        let mut videos = stmt
            .query_map([], Self::row_to_summary)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        videos.sort_by(listing_order);
        Ok(videos)
    }

    #[instrument(skip(self))]
    async fn get_video(&self, video_id: &str) -> Result<Option<IndexedVideo>> {
        let conn = self.conn()?;
        let video = conn
            .query_row(
                &format!("{} WHERE v.video_id = ?1 GROUP BY v.video_id", VIDEO_SUMMARY),
                params![video_id],
                Self::row_to_summary,
            )
            .optional()?;
        Ok(video)
    }

    #[instrument(skip(self))]
    async fn get_chunks(&self, video_id: &str) -> Result<Vec<TranscriptChunk>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transcript_chunks c WHERE c.transcript_id = ?1 ORDER BY c.chunk_index",
            CHUNK_COLUMNS
        ))?;

        let chunks = stmt
            .query_map(params![video_id], |row| Self::row_to_chunk(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        debug!("Found {} chunks for video {}", chunks.len(), video_id);
        Ok(chunks)
    }

    async fn chunks_missing_embeddings(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<TranscriptChunk>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM transcript_chunks c
            WHERE c.embedding IS NULL
            ORDER BY c.transcript_id, c.chunk_index
            LIMIT ?1
            "#,
            CHUNK_COLUMNS
        ))?;

        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map(|l| l.min(i64::MAX as usize) as i64).unwrap_or(-1);
        let chunks = stmt
            .query_map(params![limit], |row| Self::row_to_chunk(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chunks)
    }

    async fn load_transcript(&self, video_id: &str) -> Result<Option<StoredTranscript>> {
        let conn = self.conn()?;
        let stored = conn
            .query_row(
                r#"
                SELECT video_id, external_id, title, creator, duration_seconds, transcript_json
                FROM video_transcripts WHERE video_id = ?1
                "#,
                params![video_id],
                Self::row_to_stored,
            )
            .optional()?;
        Ok(stored)
    }

    async fn load_transcripts(&self) -> Result<Vec<StoredTranscript>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT video_id, external_id, title, creator, duration_seconds, transcript_json
            FROM video_transcripts ORDER BY video_id
            "#,
        )?;

        let stored = stmt
            .query_map([], Self::row_to_stored)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(stored)
    }

    async fn chunk_count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM transcript_chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    async fn stats(&self, since: DateTime<Utc>) -> Result<IndexStats> {
        let conn = self.conn()?;
        let (videos, chunks, embedded): (i64, i64, i64) = conn.query_row(
            r#"
            SELECT (SELECT COUNT(*) FROM video_transcripts),
                   COUNT(*),
                   COUNT(embedding)
            FROM transcript_chunks
            "#,
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let mut stmt = conn.prepare("SELECT processed_at FROM video_transcripts")?;
        let recent = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .iter()
            .filter_map(|at| DateTime::parse_from_rfc3339(at).ok())
            .filter(|at| at.with_timezone(&Utc) > since)
            .count();

        Ok(IndexStats::new(
            videos as usize,
            chunks as usize,
            embedded as usize,
            recent,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::TranscriptSegment;

    fn transcript(id: &str, title: &str) -> VideoTranscript {
        VideoTranscript::new(
            id,
            format!("yt-{}", id),
            title,
            "Tester",
            Some(60.0),
            vec![
                TranscriptSegment::new("This is test content", 0, 30_000),
                TranscriptSegment::new("More content", 30_000, 30_000),
            ],
        )
    }

    fn chunks(id: &str) -> Vec<TranscriptChunk> {
        let mut first = TranscriptChunk::new(0, id, "This is test content".to_string(), 0.0, 30.0);
        first.embedding = Some(vec![1.0, 0.0, 0.0]);
        let second = TranscriptChunk::new(1, id, "More content".to_string(), 30.0, 60.0);
        vec![first, second]
    }

    #[tokio::test]
    async fn test_sqlite_vector_store() {
        let store = SqliteVectorStore::in_memory().unwrap();
        store
            .replace_transcript(&transcript("video1", "Test Video"), &chunks("video1"))
            .await
            .unwrap();

        let videos = store.list_videos().await.unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].metadata.video_id, "video1");
        assert_eq!(videos[0].chunk_count, 2);
        assert_eq!(videos[0].embedded_count, 1);

        let results = store.search(&[1.0, 0.0, 0.0], 10, 0.0, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0].similarity_score - 1.0).abs() < 0.001);
        assert_eq!(results[0].external_id, "yt-video1");

        assert!(store.delete_transcript("video1").await.unwrap());
        assert!(store.list_videos().await.unwrap().is_empty());
        assert_eq!(store.chunk_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reingest_replaces_chunks_and_metadata() {
        let store = SqliteVectorStore::in_memory().unwrap();
        store
            .replace_transcript(&transcript("v", "Old"), &chunks("v"))
            .await
            .unwrap();
        store
            .replace_transcript(&transcript("v", "New"), &chunks("v")[..1])
            .await
            .unwrap();

        let video = store.get_video("v").await.unwrap().unwrap();
        assert_eq!(video.metadata.title, "New");
        assert_eq!(video.chunk_count, 1);
        assert_eq!(store.chunk_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_embedding_backfill_roundtrip() {
        let store = SqliteVectorStore::in_memory().unwrap();
        store
            .replace_transcript(&transcript("v", "T"), &chunks("v"))
            .await
            .unwrap();

        let missing = store.chunks_missing_embeddings(Some(10)).await.unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].chunk_index, 1);

        store
            .set_embedding("v", 1, vec![0.25, -0.5, 0.75])
            .await
            .unwrap();
        let stored = store.get_chunks("v").await.unwrap();
        assert_eq!(stored[1].embedding, Some(vec![0.25, -0.5, 0.75]));
        assert!(store.chunks_missing_embeddings(None).await.unwrap().is_empty());

        assert!(store.set_embedding("v", 9, vec![1.0]).await.is_err());
    }

    #[tokio::test]
    async fn test_load_transcripts_keeps_payload() {
        let store = SqliteVectorStore::in_memory().unwrap();
        store
            .replace_transcript(&transcript("v", "T"), &chunks("v"))
            .await
            .unwrap();

        let stored = store.load_transcript("v").await.unwrap().unwrap();
        let segments = crate::transcript::normalize_str(stored.payload.as_deref().unwrap()).unwrap();
        assert_eq!(segments.len(), 2);
        assert!(store.load_transcript("missing").await.unwrap().is_none());
        assert_eq!(store.load_transcripts().await.unwrap().len(), 1);
    }

    #[test]
    fn test_truncated_blob_is_rejected() {
        assert!(SqliteVectorStore::bytes_to_embedding(&[0, 0, 128]).is_none());
        let bytes = SqliteVectorStore::embedding_to_bytes(&[1.5, -2.0]);
        assert_eq!(
            SqliteVectorStore::bytes_to_embedding(&bytes),
            Some(vec![1.5, -2.0])
        );
    }

    #[tokio::test]
    async fn test_index_stats() {
        let store = SqliteVectorStore::in_memory().unwrap();
        let since = Utc::now() - chrono::Duration::hours(24);
        let empty = store.stats(since).await.unwrap();
        assert_eq!(empty.total_videos, 0);
        assert_eq!(empty.avg_chunks_per_video, 0.0);

        store
            .replace_transcript(&transcript("v1", "One"), &chunks("v1"))
            .await
            .unwrap();
        store
            .replace_transcript(&transcript("v2", "Two"), &chunks("v2"))
            .await
            .unwrap();
        store
            .set_embedding("v2", 1, vec![0.0, 1.0, 0.0])
            .await
            .unwrap();

        let stats = store.stats(since).await.unwrap();
        assert_eq!(stats.total_videos, 2);
        assert_eq!(stats.total_chunks, 4);
        assert_eq!(stats.embedded_chunks, 3);
        assert_eq!(stats.avg_chunks_per_video, 2.0);
        assert_eq!(stats.recently_processed, 2);

        let future = Utc::now() + chrono::Duration::minutes(1);
        assert_eq!(store.stats(future).await.unwrap().recently_processed, 0);
    }

    #[tokio::test]
    async fn test_search_caps_chunks_per_video() {
        let store = SqliteVectorStore::in_memory().unwrap();
        store
            .replace_transcript(&transcript("v1", "One"), &chunks("v1"))
            .await
            .unwrap();
        store
            .set_embedding("v1", 1, vec![0.9, 0.1, 0.0])
            .await
            .unwrap();

        assert_eq!(store.search(&[1.0, 0.0, 0.0], 10, 0.0, None).await.unwrap().len(), 2);
        let capped = store.search(&[1.0, 0.0, 0.0], 10, 0.0, Some(1)).await.unwrap();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].chunk.chunk_index, 0);
    }
}

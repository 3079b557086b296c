//! End-to-end tests of the ingest and question-answering paths.

mod common;

use blox_wizard::cache::{CacheStore, SqliteCacheStore};
use blox_wizard::config::CacheSettings;
use blox_wizard::embedding::{Embedder, HashingEmbedder, RetryPolicy, RetryingEmbedder};
use blox_wizard::orchestrator::{Orchestrator, TranscriptStatus};
use blox_wizard::rag::{QueryRequest, RagEngine, NO_RESULTS_ANSWER};
use blox_wizard::vector_store::{SqliteVectorStore, VectorStore};
use blox_wizard::WizardError;
use common::*;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn fast_retries(inner: Arc<dyn Embedder>) -> Arc<dyn Embedder> {
    Arc::new(RetryingEmbedder::new(
        inner,
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        },
    ))
}

#[tokio::test]
async fn test_three_segments_form_one_chunk() {
    let orch = Orchestrator::new(offline_settings()).unwrap();
    let report = orch
        .ingest(video(
            "v1",
            "Scenario",
            json!([
                {"text": "intro", "offset": 0, "duration": 5000},
                {"text": "middle", "offset": 5000, "duration": 20000},
                {"text": "end", "offset": 25000, "duration": 10000}
            ]),
        ))
        .await
        .unwrap();

    assert_eq!(report.chunks_created, 1);
    let chunks = orch.vector_store().get_chunks("v1").await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "intro middle end");
    assert_eq!(chunks[0].start_seconds, 0.0);
    assert_eq!(chunks[0].end_seconds, 35.0);
    assert!(chunks[0].is_embedded());
}

#[tokio::test]
async fn test_object_payload_is_rejected_without_writes() {
    let orch = Orchestrator::new(offline_settings()).unwrap();
    let err = orch.ingest(video("v1", "Broken", json!({}))).await.unwrap_err();

    assert!(matches!(err, WizardError::InvalidTranscript(_)));
    assert_eq!(orch.vector_store().chunk_count().await.unwrap(), 0);
    assert!(orch.vector_store().get_video("v1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_reingest_replaces_chunks() {
    let orch = Orchestrator::new(offline_settings()).unwrap();
    let segments = json!([
        {"text": "first", "offsetMs": 0, "durationMs": 1000},
        {"text": "second", "offsetMs": 40000, "durationMs": 1000}
    ]);

    orch.ingest(video("v1", "Twice", segments.clone())).await.unwrap();
    orch.ingest(video("v1", "Twice", segments)).await.unwrap();

    let chunks = orch.vector_store().get_chunks("v1").await.unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(orch.vector_store().chunk_count().await.unwrap(), 2);
    assert_ne!(chunks[0].text, chunks[1].text);
}

#[tokio::test]
async fn test_below_threshold_question_gets_graceful_answer() {
    let orch = Orchestrator::new(offline_settings()).unwrap();
    orch.ingest_batch(library()).await;
    let engine = orch.rag_engine().unwrap();

    let response = engine
        .ask(&QueryRequest::new("quantum chromodynamics lattice").with_threshold(0.5))
        .await
        .unwrap();

    assert!(response.video_references.is_empty());
    assert_eq!(response.answer, NO_RESULTS_ANSWER);
    assert!(!response.confidence.is_nan());
    assert_eq!(response.confidence, 0.0);
    assert!(response.suggested_questions.len() >= 2);
}

#[tokio::test]
async fn test_answer_references_best_video() {
    let orch = Orchestrator::new(offline_settings()).unwrap();
    orch.ingest_batch(library()).await;
    let engine = orch.rag_engine().unwrap();

    let response = engine
        .ask(&QueryRequest::new("How does TweenService move a part smoothly?").with_threshold(0.1))
        .await
        .unwrap();

    let top = &response.video_references[0];
    assert_eq!(top.title, "TweenService Basics");
    assert_eq!(top.video_external_id, "yt-tween-101");
    assert_eq!(top.timestamp_url, "https://www.youtube.com/watch?v=yt-tween-101&t=0s");
    assert!(response.answer.contains("TweenService moves a part smoothly"));
    assert!(response
        .suggested_questions
        .iter()
        .all(|q| q != "How does TweenService move a part smoothly?"));
}

#[tokio::test]
async fn test_cache_idempotence() {
    let orch = Orchestrator::new(offline_settings()).unwrap();
    orch.ingest_batch(library()).await;
    let engine = orch.rag_engine().unwrap();

    let first = engine.ask(&QueryRequest::new("How do I make a GUI button?")).await.unwrap();
    let second = engine
        .ask(&QueryRequest::new("how do i make a gui   BUTTON?"))
        .await
        .unwrap();

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(first.answer, second.answer);
    assert_eq!(first.video_references, second.video_references);
}

#[tokio::test]
async fn test_ingest_invalidates_cache() {
    let orch = Orchestrator::new(offline_settings()).unwrap();
    let engine = orch.rag_engine().unwrap();

    let before = engine.ask(&QueryRequest::new("How do I use TweenService?")).await.unwrap();
    assert!(before.video_references.is_empty());

    orch.ingest_batch(library()).await;

    let after = engine
        .ask(&QueryRequest::new("How do I use TweenService?").with_threshold(0.05))
        .await
        .unwrap();
    assert!(!after.cache_hit);
    assert!(!after.video_references.is_empty());
}

#[tokio::test]
async fn test_ingest_during_answer_is_not_served_stale() {
    let orch = Orchestrator::new(offline_settings()).unwrap();
    let gated = Arc::new(GatedSynthesizer::new());
    let engine = Arc::new(
        RagEngine::new(orch.embedder(), orch.vector_store(), gated.clone())
            .with_cache(orch.cache(), CacheSettings::default()),
    );
    let request = QueryRequest::new("How do I use TweenService?").with_threshold(0.05);

    let in_flight = {
        let engine = engine.clone();
        let request = request.clone();
        tokio::spawn(async move { engine.ask(&request).await })
    };
    gated.started.notified().await;
    orch.ingest_batch(library()).await;
    gated.release.notify_one();

    let before = in_flight.await.unwrap().unwrap();
    assert!(before.video_references.is_empty());

    gated.release.notify_one();
    let after = engine.ask(&request).await.unwrap();
    assert!(!after.cache_hit);
    assert!(!after.video_references.is_empty());
}

#[tokio::test]
async fn test_delete_invalidates_cache() {
    let orch = Orchestrator::new(offline_settings()).unwrap();
    orch.ingest_batch(library()).await;
    let engine = orch.rag_engine().unwrap();
    let request = QueryRequest::new("How do I use TweenService?").with_threshold(0.05);

    let first = engine.ask(&request).await.unwrap();
    assert!(first
        .video_references
        .iter()
        .any(|r| r.video_external_id == "yt-tween-101"));

    assert!(orch.delete("tween-101").await.unwrap());

    let second = engine.ask(&request).await.unwrap();
    assert!(!second.cache_hit);
    assert!(second
        .video_references
        .iter()
        .all(|r| r.video_external_id != "yt-tween-101"));
}

#[tokio::test]
async fn test_rechunk_invalidates_cache() {
    let orch = Orchestrator::new(offline_settings()).unwrap();
    orch.ingest_batch(library()).await;
    let engine = orch.rag_engine().unwrap();
    let request = QueryRequest::new("What is a ScreenGui?").with_threshold(0.05);

    engine.ask(&request).await.unwrap();
    assert!(engine.ask(&request).await.unwrap().cache_hit);

    orch.rechunk("gui-101").await.unwrap();

    assert!(!engine.ask(&request).await.unwrap().cache_hit);
}

#[tokio::test]
async fn test_search_quota_spreads_videos() {
    let orch = Orchestrator::new(offline_settings()).unwrap();
    orch.ingest(video(
        "long",
        "Long Tween Video",
        json!([
            {"text": "TweenService tween part", "offsetMs": 0, "durationMs": 1000},
            {"text": "TweenService tween part again", "offsetMs": 30000, "durationMs": 1000},
            {"text": "TweenService tween part once more", "offsetMs": 60000, "durationMs": 1000}
        ]),
    ))
    .await
    .unwrap();
    orch.ingest_batch(library()).await;
    let engine = orch.rag_engine().unwrap();

    let hits = engine.search("TweenService tween part", 10, -1.0, Some(1)).await.unwrap();
    let videos: HashSet<&str> = hits.iter().map(|h| h.video_id()).collect();
    assert_eq!(hits.len(), 3);
    assert_eq!(videos.len(), 3);
}

#[tokio::test]
async fn test_transient_embedding_errors_are_retried() {
    let flaky = Arc::new(FlakyEmbedder::new(2));
    let orch = orchestrator_with(fast_retries(flaky.clone()));

    let report = orch.ingest(library().remove(0)).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.chunks_embedded, report.chunks_created);
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_permanent_failure_is_reported_per_chunk() {
    let orch = orchestrator_with(fast_retries(Arc::new(PoisonEmbedder::new())));

    let report = orch
        .ingest(video(
            "mixed",
            "Mixed",
            json!([
                {"text": "fine words", "offsetMs": 0, "durationMs": 1000},
                {"text": "POISON here", "offsetMs": 30000, "durationMs": 1000},
                {"text": "more fine words", "offsetMs": 60000, "durationMs": 1000}
            ]),
        ))
        .await
        .unwrap();

    assert_eq!(report.chunks_created, 3);
    assert_eq!(report.chunks_embedded, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].chunk_index, 1);

    let missing = orch.vector_store().chunks_missing_embeddings(None).await.unwrap();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].chunk_index, 1);
}

#[tokio::test]
async fn test_backfill_embeds_missing_chunks() {
    let store = Arc::new(SqliteVectorStore::in_memory().unwrap());
    let cache = Arc::new(SqliteCacheStore::in_memory().unwrap());

    let poisoned = Orchestrator::with_components(
        offline_settings(),
        Arc::new(PoisonEmbedder::new()),
        store.clone(),
        cache.clone(),
    );
    poisoned
        .ingest(video(
            "v1",
            "Backfill",
            json!([{"text": "POISON then cured", "offsetMs": 0, "durationMs": 1000}]),
        ))
        .await
        .unwrap();

    let healthy = Orchestrator::with_components(
        offline_settings(),
        Arc::new(HashingEmbedder::new(DIMS)),
        store,
        cache,
    );
    let report = healthy.embed_missing(None).await.unwrap();
    assert_eq!(report.pending, 1);
    assert_eq!(report.embedded, 1);

    let again = healthy.embed_missing(None).await.unwrap();
    assert_eq!(again.pending, 0);
}

#[tokio::test]
async fn test_sqlite_round_trip_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = offline_settings();
    settings.vector_store.provider = "sqlite".to_string();
    settings.vector_store.sqlite_path = dir.path().join("wizard.db").to_string_lossy().into_owned();

    {
        let orch = Orchestrator::new(settings.clone()).unwrap();
        for outcome in orch.ingest_batch(library()).await {
            outcome.result.unwrap();
        }
    }

    let orch = Orchestrator::new(settings).unwrap();
    let videos = orch.vector_store().list_videos().await.unwrap();
    assert_eq!(videos.len(), 2);
    assert!(videos.iter().all(|v| v.chunk_count == v.embedded_count));

    let chunks = orch.vector_store().get_chunks("tween-101").await.unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[1].start_seconds, 31.0);
    assert_eq!(chunks[0].embedding.as_ref().map(Vec::len), Some(DIMS));

    let engine = orch.rag_engine().unwrap();
    let hits = engine.search("TweenInfo easing style", 1, 0.1, None).await.unwrap();
    assert_eq!(hits[0].chunk.chunk_index, 1);
    assert_eq!(hits[0].title, "TweenService Basics");
}

#[tokio::test]
async fn test_verify_flags_corrupted_rows() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("wizard.db");
    let mut settings = offline_settings();
    settings.vector_store.provider = "sqlite".to_string();
    settings.vector_store.sqlite_path = db.to_string_lossy().into_owned();

    let orch = Orchestrator::new(settings).unwrap();
    orch.ingest_batch(library()).await;

    let conn = rusqlite::Connection::open(&db).unwrap();
    conn.execute(
        "UPDATE video_transcripts SET transcript_json = '{}' WHERE video_id = 'gui-101'",
        [],
    )
    .unwrap();

    let report = orch.verify().await.unwrap();
    let status = |id: &str| report.iter().find(|h| h.video_id == id).unwrap().status;
    assert_eq!(status("gui-101"), TranscriptStatus::Invalid);
    assert_eq!(status("tween-101"), TranscriptStatus::Usable);

    let outcomes = orch.rechunk_all().await.unwrap();
    let failed: Vec<_> = outcomes.iter().filter(|o| o.result.is_err()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].video_id, "gui-101");
}

#[tokio::test]
async fn test_cache_maintenance_on_sqlite() {
    let cache = SqliteCacheStore::in_memory().unwrap();
    let store = Arc::new(SqliteVectorStore::in_memory().unwrap());
    let cache = Arc::new(cache);
    let orch = Orchestrator::with_components(
        offline_settings(),
        Arc::new(HashingEmbedder::new(DIMS)),
        store,
        cache.clone(),
    );
    let engine = orch.rag_engine().unwrap();

    engine.ask(&QueryRequest::new("What is a ScreenGui?")).await.unwrap();
    engine.ask(&QueryRequest::new("What is a ScreenGui?")).await.unwrap();

    let stats = cache.stats(chrono::Utc::now()).await.unwrap();
    assert_eq!(stats.questions, 1);
    assert_eq!(stats.total_usage, 2);

    assert!(cache.evict("what is a screengui?").await.unwrap());
    assert_eq!(cache.stats(chrono::Utc::now()).await.unwrap().questions, 0);
}

//! HTTP API server for integration with other systems.
//!
//! Provides REST endpoints for ingestion, search and question answering.

use crate::cache::CacheStats;
use crate::chunking::VideoExport;
use crate::cli::Output;
use crate::config::Settings;
use crate::error::WizardError;
use crate::orchestrator::{IngestReport, Orchestrator};
use crate::rag::{QueryRequest, QueryResponse, RagEngine};
use crate::transcript::RawVideo;
use crate::vector_store::{IndexStats, IndexedVideo, SearchResult};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info_span, Instrument};
use uuid::Uuid;

/// Shared application state.
struct AppState {
    orchestrator: Orchestrator,
    engine: RagEngine,
}

/// Run the HTTP API server.
pub async fn run_serve(host: Option<String>, port: Option<u16>, settings: Settings) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);

    let orchestrator = Orchestrator::new(settings)?;
    let engine = orchestrator.rag_engine()?;
    let state = Arc::new(AppState {
        orchestrator,
        engine,
    });

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Blox Wizard API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Ask", "POST /ask");
    Output::kv("Search", "POST /search");
    Output::kv("Ingest", "POST /ingest");
    Output::kv("List Videos", "GET  /videos");
    Output::kv("Get Video", "GET  /videos/{video_id}");
    Output::kv("Verify", "GET  /verify");
    Output::kv("Stats", "GET  /stats");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, router(state)).await?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ask", post(ask))
        .route("/search", post(search))
        .route("/ingest", post(ingest))
        .route("/videos", get(list_videos))
        .route("/videos/{video_id}", get(get_video))
        .route("/verify", get(verify))
        .route("/stats", get(stats))
        .layer(cors)
        .with_state(state)
}

// === Request/Response Types ===

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    min_score: Option<f32>,
    #[serde(default)]
    max_per_video: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestItem {
    video_id: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<IngestReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct IngestResponse {
    results: Vec<IngestItem>,
}

#[derive(Serialize)]
struct VideoListResponse {
    videos: Vec<IndexedVideo>,
    total: usize,
}

#[derive(Serialize)]
struct StatsResponse {
    index: IndexStats,
    cache: CacheStats,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    error: String,
    request_id: String,
}

/// HTTP status for a library error.
fn status_for(e: &WizardError) -> StatusCode {
    match e {
        WizardError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        e if e.is_transcript_error() => StatusCode::UNPROCESSABLE_ENTITY,
        WizardError::VideoNotFound(_) => StatusCode::NOT_FOUND,
        WizardError::SearchUnavailable(_) | WizardError::Embedding(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(request_id: Uuid, e: &WizardError) -> Response {
    let status = status_for(e);
    if status.is_server_error() {
        error!(%request_id, "Request failed: {}", e);
    }
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            request_id: request_id.to_string(),
        }),
    )
        .into_response()
}

// === Handlers ===

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let chunks = state.orchestrator.vector_store().chunk_count().await.ok();
    Json(serde_json::json!({ "status": "ok", "chunks": chunks }))
}

/// Answers always come back as a [`QueryResponse`]; only malformed requests
/// are rejected.
async fn ask(State(state): State<Arc<AppState>>, Json(req): Json<QueryRequest>) -> Response {
    let request_id = Uuid::new_v4();
    let result = state
        .engine
        .ask(&req)
        .instrument(info_span!("ask", %request_id))
        .await;

    match result {
        Ok(response) => Json(response).into_response(),
        Err(e @ WizardError::InvalidInput(_)) => error_response(request_id, &e),
        Err(e) => {
            error!(%request_id, question = %req.question, "Failed to answer question: {}", e);
            Json(QueryResponse::fallback()).into_response()
        }
    }
}

async fn search(State(state): State<Arc<AppState>>, Json(req): Json<SearchRequest>) -> Response {
    let request_id = Uuid::new_v4();
    let settings = &state.orchestrator.settings().search;
    let limit = req.limit.unwrap_or(settings.max_results);
    let min_score = req.min_score.unwrap_or(settings.similarity_threshold);

    match state
        .engine
        .search(&req.query, limit, min_score, req.max_per_video)
        .instrument(info_span!("search", %request_id))
        .await
    {
        Ok(results) => Json(SearchResponse { results }).into_response(),
        Err(e) => error_response(request_id, &e),
    }
}

/// Accepts one video object or an array of them.
async fn ingest(State(state): State<Arc<AppState>>, body: String) -> Response {
    let request_id = Uuid::new_v4();
    let videos = match RawVideo::parse_many(&body) {
        Ok(videos) => videos,
        Err(e) => {
            let e = match e {
                WizardError::Json(json) => WizardError::InvalidInput(json.to_string()),
                other => other,
            };
            return error_response(request_id, &e);
        }
    };

    let outcomes = state
        .orchestrator
        .ingest_batch(videos)
        .instrument(info_span!("ingest", %request_id))
        .await;

    let any_ok = outcomes.iter().any(|o| o.result.is_ok());
    let results: Vec<IngestItem> = outcomes
        .into_iter()
        .map(|o| match o.result {
            Ok(report) => IngestItem {
                video_id: o.video_id,
                success: true,
                report: Some(report),
                error: None,
            },
            Err(e) => IngestItem {
                video_id: o.video_id,
                success: false,
                report: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    let status = if any_ok || results.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(IngestResponse { results })).into_response()
}

async fn list_videos(State(state): State<Arc<AppState>>) -> Response {
    match state.orchestrator.vector_store().list_videos().await {
        Ok(videos) => Json(VideoListResponse {
            total: videos.len(),
            videos,
        })
        .into_response(),
        Err(e) => error_response(Uuid::new_v4(), &e),
    }
}

async fn get_video(State(state): State<Arc<AppState>>, Path(video_id): Path<String>) -> Response {
    let store = state.orchestrator.vector_store();
    let video = match store.get_video(&video_id).await {
        Ok(Some(video)) => video,
        Ok(None) => return error_response(Uuid::new_v4(), &WizardError::VideoNotFound(video_id)),
        Err(e) => return error_response(Uuid::new_v4(), &e),
    };

    match store.get_chunks(&video_id).await {
        Ok(chunks) => Json(VideoExport::new(&video.metadata, &chunks)).into_response(),
        Err(e) => error_response(Uuid::new_v4(), &e),
    }
}

async fn verify(State(state): State<Arc<AppState>>) -> Response {
    match state.orchestrator.verify().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(Uuid::new_v4(), &e),
    }
}

async fn stats(State(state): State<Arc<AppState>>) -> Response {
    let now = Utc::now();
    let index = state
        .orchestrator
        .vector_store()
        .stats(now - Duration::hours(24))
        .await;
    let cache = state.orchestrator.cache().stats(now).await;

    match (index, cache) {
        (Ok(index), Ok(cache)) => Json(StatsResponse { index, cache }).into_response(),
        (Err(e), _) | (_, Err(e)) => error_response(Uuid::new_v4(), &e),
    }
}

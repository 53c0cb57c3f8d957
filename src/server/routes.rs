use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::models::{BatchRequest, CrawlOptions, CrawlProgress, CrawlRecord, ExtractionOptions, ScraperOptions};
use crate::policy::robots::RobotsChecker;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateCrawlRequest {
    pub origin_url: String,
    #[serde(default)]
    pub options: CrawlOptions,
    #[serde(default)]
    pub scrape_options: ScraperOptions,
    #[serde(default)]
    pub extraction: Option<ExtractionOptions>,
}

#[derive(Debug, Serialize)]
pub struct CreateCrawlResponse {
    pub crawl_id: String,
    pub jobs_enqueued: usize,
}

/// POST /api/v1/crawls
///
/// Creates a crawl record, fetches robots.txt once for the origin, and
/// runs kickoff (seed fetch + discovery + initial enqueue) inline — the
/// resulting page jobs are then picked up by the job queue's workers.
pub async fn create_crawl(
    State(state): State<AppState>,
    Json(payload): Json<CreateCrawlRequest>,
) -> impl IntoResponse {
    let crawl_id = Uuid::new_v4().to_string();

    let client = reqwest::Client::new();
    let robots_txt =
        RobotsChecker::fetch_text(&client, &payload.origin_url, payload.scrape_options.skip_tls_verification).await;

    let record = CrawlRecord {
        id: crawl_id.clone(),
        origin_url: payload.origin_url.clone(),
        options: payload.options,
        scrape_options: payload.scrape_options,
        created_at_ms: now_ms(),
        robots_txt,
        cancelled: false,
        extraction: payload.extraction,
    };

    if let Err(e) = state.orchestrator.crawl_state.save_crawl(&record).await {
        tracing::error!(crawl_id, error = %e, "failed to persist crawl record");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "failed to create crawl" })),
        )
            .into_response();
    }

    match state.orchestrator.kickoff(&crawl_id).await {
        Ok(jobs_enqueued) => {
            tracing::info!(crawl_id, jobs_enqueued, origin_url = %record.origin_url, "crawl kicked off");
            (
                StatusCode::ACCEPTED,
                Json(CreateCrawlResponse { crawl_id, jobs_enqueued }),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(crawl_id, error = %e, "kickoff failed");
            (StatusCode::BAD_GATEWAY, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CrawlStatusResponse {
    pub crawl_id: String,
    pub cancelled: bool,
    pub progress: CrawlProgress,
}

/// GET /api/v1/crawls/:id/status
pub async fn crawl_status(State(state): State<AppState>, Path(crawl_id): Path<String>) -> impl IntoResponse {
    let crawl_state = &state.orchestrator.crawl_state;

    let Ok(Some(_record)) = crawl_state.get_crawl(&crawl_id).await else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "crawl not found" }))).into_response();
    };

    let discovered = crawl_state.locked_count(&crawl_id).await.unwrap_or(0);
    let crawled = crawl_state.done_success_count(&crawl_id).await.unwrap_or(0);
    let failed = crawl_state.done_failed_count(&crawl_id).await.unwrap_or(0);
    let cancelled = crawl_state.is_cancelled(&crawl_id).await.unwrap_or(false);

    (
        StatusCode::OK,
        Json(CrawlStatusResponse {
            crawl_id,
            cancelled,
            progress: CrawlProgress {
                discovered,
                crawled,
                failed,
            },
        }),
    )
        .into_response()
}

/// POST /api/v1/crawls/:id/cancel
pub async fn cancel_crawl(State(state): State<AppState>, Path(crawl_id): Path<String>) -> impl IntoResponse {
    match state.orchestrator.cancel(&crawl_id).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "crawl_id": crawl_id, "status": "cancelled" }))).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

/// POST /api/v1/batches
pub async fn create_batch(State(state): State<AppState>, Json(payload): Json<BatchRequest>) -> impl IntoResponse {
    match state.batch.submit(payload).await {
        Ok(batch_id) => (StatusCode::ACCEPTED, Json(json!({ "batch_id": batch_id }))).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

/// GET /api/v1/batches/:id/status
pub async fn batch_status(State(state): State<AppState>, Path(batch_id): Path<String>) -> impl IntoResponse {
    match state.batch.status(&batch_id).await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

/// POST /api/v1/batches/:id/cancel
pub async fn cancel_batch(State(state): State<AppState>, Path(batch_id): Path<String>) -> impl IntoResponse {
    match state.batch.cancel(&batch_id).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "batch_id": batch_id, "status": "cancelled" }))).into_response(),
        Err(e) => (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

/// GET /api/v1/health
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

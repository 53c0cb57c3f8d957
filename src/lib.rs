pub mod analysis;
pub mod batch;
pub mod config;
pub mod content;
pub mod fetcher;
pub mod lighthouse;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod policy;
pub mod queue;
pub mod renderer;
pub mod server;
pub mod store;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::batch::BatchOrchestrator;
use crate::config::Config;
use crate::fetcher::Fetcher;
use crate::lighthouse::LighthouseRunner;
use crate::llm::LlmExtractor;
use crate::orchestrator::export::Exporter;
use crate::orchestrator::Orchestrator;
use crate::queue::JobQueue;
use crate::renderer::JsRenderer;
use crate::store::crawl_state::CrawlStateStore;
use crate::store::RedisStore;

/// Shared application state passed to all Axum handlers and background
/// worker loops.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<Orchestrator>,
    pub batch: Arc<BatchOrchestrator>,
}

/// Build every collaborator wired together the way `main` needs them,
/// from a connected store and loaded config (spec §4: components C1-C7
/// composed into one running service).
pub async fn build_state(config: Arc<Config>) -> Result<AppState, store::StoreError> {
    let store = RedisStore::connect(&config.redis_url()).await?;
    let crawl_state = CrawlStateStore::new(store.clone());
    let queue = Arc::new(JobQueue::new(
        store.clone(),
        config.crawler_concurrency,
        config.crawler_min_concurrency,
        config.crawler_max_concurrency,
    ));
    let fetcher = Arc::new(Fetcher::new(1024));
    let exporter = Exporter::new(config.crawl_output_dir.clone());
    let llm = LlmExtractor::new(config.llm_extractor_endpoint.clone());
    let lighthouse = LighthouseRunner::new(config.max_concurrent_lighthouse, None);
    let renderer = JsRenderer::new(config.max_concurrent_renderers, config.renderer_script_path.clone());

    let orchestrator = Arc::new(Orchestrator::new(
        crawl_state,
        queue,
        fetcher.clone(),
        exporter,
        llm,
        config.webhook_secret.clone(),
        lighthouse,
        renderer,
    ));
    let batch = Arc::new(BatchOrchestrator::new(fetcher));

    Ok(AppState {
        config,
        orchestrator,
        batch,
    })
}

pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let authenticated_routes = Router::new()
        .route("/api/v1/crawls", post(server::routes::create_crawl))
        .route("/api/v1/crawls/{id}/status", get(server::routes::crawl_status))
        .route("/api/v1/crawls/{id}/cancel", post(server::routes::cancel_crawl))
        .route("/api/v1/batches", post(server::routes::create_batch))
        .route("/api/v1/batches/{id}/status", get(server::routes::batch_status))
        .route("/api/v1/batches/{id}/cancel", post(server::routes::cancel_batch))
        .layer(middleware::from_fn_with_state(state.clone(), server::auth::verify_hmac));

    let public_routes = Router::new().route("/api/v1/health", get(server::routes::health));

    Router::new()
        .merge(authenticated_routes)
        .merge(public_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

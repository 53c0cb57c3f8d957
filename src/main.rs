use crawler::{build_app, build_state, config::Config};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(Config::from_env().expect("Failed to load configuration from environment"));
    let port = config.port;
    let dynamic_scaling = config.crawler_enable_dynamic_scaling;

    let state = build_state(config)
        .await
        .expect("Failed to connect to the store");

    let worker_cancel = CancellationToken::new();
    if dynamic_scaling {
        let queue = state.orchestrator.queue.clone();
        let cancel = worker_cancel.clone();
        tokio::spawn(async move { queue.run_dynamic_scaling(cancel).await });
    }

    {
        let queue = state.orchestrator.queue.clone();
        let cancel = worker_cancel.clone();
        tokio::spawn(async move { queue.run_lease_reaper(cancel).await });
    }

    let retry_attempts = state.config.crawler_retry_attempts;
    let retry_delay = std::time::Duration::from_millis(state.config.crawler_retry_delay_ms);
    {
        let orchestrator = state.orchestrator.clone();
        let cancel = worker_cancel.clone();
        tokio::spawn(async move { orchestrator.run_pool(retry_attempts, retry_delay, cancel).await });
    }

    let app = build_app(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("Crawler service starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app).await.expect("Server error");
}

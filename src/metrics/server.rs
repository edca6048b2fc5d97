use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use log::{error, info};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::lifecycle::Shutdown;

/// Render every metric in `registry` in the Prometheus text format
pub fn encode_metrics(registry: &Registry) -> Result<String, String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&registry.gather(), &mut buffer)
        .map_err(|e| format!("Encoding error: {}", e))?;
    String::from_utf8(buffer).map_err(|e| format!("UTF-8 error: {}", e))
}

pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(|| async { "ok" }))
        .with_state(registry)
}

async fn metrics_handler(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    match encode_metrics(&registry) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

/// Serve the metrics endpoint until `shutdown` fires
///
/// Whatever the gauges hold at request time is what a scrape sees.
pub async fn serve(
    listener: TcpListener,
    registry: Arc<Registry>,
    shutdown: Shutdown,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Metrics endpoint: http://{}/metrics", addr);
    }

    axum::serve(listener, router(registry))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

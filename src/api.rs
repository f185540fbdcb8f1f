//! Observability HTTP surface.
//!
//! A small Axum router exposing:
//!
//! - `GET /health` – Liveness probe returning `{"status":"ok"}`.
//! - `GET /metrics` – Pipeline counters and the processing-time histogram in the Prometheus text
//!   exposition format.
//! - `GET /metrics/snapshot` – The same counters as JSON.

use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use axum::{
    Json, Router,
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Build the router serving health and metrics for `metrics`.
pub fn create_router(metrics: Arc<PipelineMetrics>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .route("/metrics/snapshot", get(metrics_snapshot))
        .with_state(metrics)
}

/// Serve the observability router on `listener` until the task is dropped.
pub async fn serve(listener: TcpListener, metrics: Arc<PipelineMetrics>) -> std::io::Result<()> {
    if let Ok(address) = listener.local_addr() {
        tracing::info!(%address, "Metrics server listening");
    }
    axum::serve(listener, create_router(metrics)).await
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn prometheus_metrics(State(metrics): State<Arc<PipelineMetrics>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        metrics.render_prometheus(),
    )
}

async fn metrics_snapshot(State(metrics): State<Arc<PipelineMetrics>>) -> Json<MetricsSnapshot> {
    Json(metrics.snapshot())
}

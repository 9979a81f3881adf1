//! Health and metrics HTTP endpoints: a small Axum router the embedding
//! binary runs on a background task, not something the scheduling loop
//! itself depends on for correctness (the loop is plain-thread synchronous,
//! see `scheduler.rs`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;

use crate::metrics::SchedulerMetrics;

pub struct HealthState {
    pub metrics: SchedulerMetrics,
    pub ready: Arc<AtomicBool>,
}

impl HealthState {
    pub fn new(metrics: SchedulerMetrics) -> Self {
        Self {
            metrics,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }
}

pub fn health_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn ready(State(state): State<Arc<HealthState>>) -> Result<&'static str, StatusCode> {
    if state.ready.load(Ordering::Relaxed) {
        Ok("OK")
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

async fn metrics(State(state): State<Arc<HealthState>>) -> String {
    state.metrics.encode()
}

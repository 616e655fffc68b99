//! Health and metrics endpoints.
//!
//! These endpoints are scraped by the platform: liveness and readiness probes
//! plus the Prometheus exposition.
//!
//! ```text
//! GET /isalive   200 while the process runs
//! GET /isready   200 once the rapid subscription is live, 503 otherwise
//! GET /metrics   Prometheus text format
//! ```

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use dp_klageinstans_runtime::MetricsRecorder;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Content type of the Prometheus text exposition format.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Shared state of the health server.
#[derive(Debug, Clone)]
pub struct HealthState {
    ready: Arc<AtomicBool>,
    metrics: Arc<MetricsRecorder>,
}

impl HealthState {
    /// Create state reading readiness from the consumer's flag.
    #[must_use]
    pub const fn new(ready: Arc<AtomicBool>, metrics: Arc<MetricsRecorder>) -> Self {
        Self { ready, metrics }
    }
}

/// Build the router serving all health endpoints.
pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/isalive", get(is_alive))
        .route("/isready", get(is_ready))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Liveness probe.
///
/// Does not look at the rapid; a stalled consumer surfaces through readiness.
#[allow(clippy::unused_async)]
pub async fn is_alive() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ALIVE")
}

/// Readiness probe.
#[allow(clippy::unused_async)]
pub async fn is_ready(State(state): State<HealthState>) -> (StatusCode, &'static str) {
    if state.ready.load(Ordering::SeqCst) {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

/// Prometheus scrape endpoint.
#[allow(clippy::unused_async)]
pub async fn metrics(State(state): State<HealthState>) -> impl IntoResponse {
    let body = state.metrics.render().unwrap_or_default();
    ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(ready: bool) -> HealthState {
        HealthState::new(
            Arc::new(AtomicBool::new(ready)),
            Arc::new(MetricsRecorder::new()),
        )
    }

    #[tokio::test]
    async fn test_alive() {
        let (status, body) = is_alive().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ALIVE");
    }

    #[tokio::test]
    async fn test_ready_follows_flag() {
        let state = state(false);

        let (status, _) = is_ready(State(state.clone())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        state.ready.store(true, Ordering::SeqCst);
        let (status, body) = is_ready(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "READY");
    }

    #[tokio::test]
    async fn test_metrics_without_recorder_is_empty() {
        let response = metrics(State(state(true))).await.into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
            Some(PROMETHEUS_CONTENT_TYPE.as_bytes())
        );
    }
}

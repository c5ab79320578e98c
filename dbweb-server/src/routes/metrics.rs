//! Prometheus exposition endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use dbweb_core::PrometheusMetrics;

use crate::error::ApiError;
use crate::state::AppState;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// GET /metrics
async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let prometheus = state.prometheus.as_ref().ok_or(ApiError::NotFound {
        resource: "metrics",
    })?;
    render(prometheus)
}

fn render(prometheus: &PrometheusMetrics) -> Result<impl IntoResponse, ApiError> {
    let body = prometheus.render().map_err(|e| ApiError::Internal {
        message: format!("failed to render metrics: {}", e),
    })?;
    Ok(([(header::CONTENT_TYPE, CONTENT_TYPE)], body))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/metrics", get(metrics))
}

/// Router for the standalone metrics listener
pub fn standalone(prometheus: PrometheusMetrics) -> Router {
    Router::new().route(
        "/metrics",
        get(move || {
            let prometheus = prometheus.clone();
            async move { render(&prometheus) }
        }),
    )
}

//! Liveness plus a view of the connection store

use std::sync::Arc;

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use dbweb_core::StoreMode;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// `single` or `sessions`
    pub mode: &'static str,
    /// Live backend connections held by the store
    pub connections: usize,
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let store = state.store();
    let mode = match store.mode() {
        StoreMode::Single => "single",
        StoreMode::Sessions => "sessions",
    };

    Json(HealthResponse {
        status: "ok",
        mode,
        connections: store.count(),
    })
}

/// Ungated, so it answers even while no database is connected
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

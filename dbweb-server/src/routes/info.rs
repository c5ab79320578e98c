//! Application info, reachable without a connection

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use dbweb_core::StoreMode;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub app: &'static str,
    pub version: &'static str,
    pub sessions: bool,
    pub lock_session: bool,
    pub read_only: bool,
}

/// GET /api/info
async fn info(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    Json(InfoResponse {
        app: "dbweb",
        version: env!("CARGO_PKG_VERSION"),
        sessions: state.store().mode() == StoreMode::Sessions,
        lock_session: state.settings.lock_session,
        read_only: state.settings.read_only,
    })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/info", get(info))
}

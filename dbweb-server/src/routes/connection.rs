//! Connect, disconnect and switch-database endpoints
//!
//! Every route here goes through the store, so the same handlers serve the
//! single-connection and multi-session modes.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dbweb_core::{ConnectionHandle, ConnectionParams, Rejection, StoreMode};

use crate::error::ApiError;
use crate::extractors::SessionId;
use crate::state::AppState;

/// Live connection summary
#[derive(Debug, Serialize)]
pub struct ConnectionResponse {
    /// Connection target with the password masked
    pub target: String,
    pub database: Option<String>,
    pub version: String,
    pub read_only: bool,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SwitchRequest {
    #[serde(default)]
    pub db: String,
}

#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub disconnected: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub sessions: usize,
}

fn ensure_unlocked(state: &AppState) -> Result<(), ApiError> {
    if state.settings.lock_session {
        return Err(ApiError::Forbidden {
            reason: "session is locked".to_string(),
        });
    }
    Ok(())
}

/// Query the server through the handle. Counts as a query, so it also
/// refreshes the handle's activity.
async fn describe(
    state: &AppState,
    handle: &ConnectionHandle,
) -> Result<ConnectionResponse, ApiError> {
    let version = handle.server_version(state.metrics.as_ref()).await?;

    let params = handle.params();
    Ok(ConnectionResponse {
        target: params.redacted(),
        database: params.database.clone(),
        version,
        read_only: params.read_only,
        last_activity: handle.last_activity(),
    })
}

/// Open a connection for `params` and install it for the caller. The new
/// handle is closed if it never gets installed.
async fn open_and_attach(
    state: &AppState,
    session: &SessionId,
    params: &ConnectionParams,
) -> Result<ConnectionResponse, ApiError> {
    let handle = Arc::new(state.establisher.establish(params).await?);

    match install(state, session, &handle).await {
        Ok(response) => {
            tracing::info!(target_db = %params.redacted(), "connection attached");
            Ok(response)
        }
        Err(e) => {
            if let Err(close_err) = handle.close().await {
                tracing::warn!(error = %close_err, "failed to close unused connection");
            }
            Err(e)
        }
    }
}

async fn install(
    state: &AppState,
    session: &SessionId,
    handle: &Arc<ConnectionHandle>,
) -> Result<ConnectionResponse, ApiError> {
    let response = describe(state, handle).await?;
    state
        .store()
        .attach(session.as_deref(), Arc::clone(handle))
        .await?;
    Ok(response)
}

/// POST /api/connect
async fn connect(
    State(state): State<Arc<AppState>>,
    session: SessionId,
    Json(mut params): Json<ConnectionParams>,
) -> Result<Json<ConnectionResponse>, ApiError> {
    ensure_unlocked(&state)?;

    if state.store().mode() == StoreMode::Sessions && session.as_deref().is_none() {
        return Err(Rejection::SessionRequired.into());
    }
    if params.is_blank() {
        return Err(ApiError::validation("connection url or host is required"));
    }

    params.read_only = params.read_only || state.settings.read_only;
    params.open_timeout = state.settings.open_timeout;

    open_and_attach(&state, &session, &params).await.map(Json)
}

/// POST /api/switchdb
async fn switch_database(
    State(state): State<Arc<AppState>>,
    session: SessionId,
    Extension(handle): Extension<Arc<ConnectionHandle>>,
    Json(req): Json<SwitchRequest>,
) -> Result<Json<ConnectionResponse>, ApiError> {
    ensure_unlocked(&state)?;

    let db = req.db.trim();
    if db.is_empty() {
        return Err(ApiError::validation("database name is required"));
    }

    let params = handle.params().with_database(db);
    open_and_attach(&state, &session, &params).await.map(Json)
}

/// POST /api/disconnect
async fn disconnect(
    State(state): State<Arc<AppState>>,
    session: SessionId,
) -> Result<Json<DisconnectResponse>, ApiError> {
    let disconnected = state.store().detach(session.as_deref()).await?;
    Ok(Json(DisconnectResponse { disconnected }))
}

/// GET /api/connection
async fn connection(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<Arc<ConnectionHandle>>,
) -> Result<Json<ConnectionResponse>, ApiError> {
    describe(&state, &handle).await.map(Json)
}

/// GET /api/sessions
async fn sessions(State(state): State<Arc<AppState>>) -> Json<SessionsResponse> {
    Json(SessionsResponse {
        sessions: state.store().count(),
    })
}

/// Connection routes. `/api/sessions` only exists in multi-session mode.
pub fn router(mode: StoreMode) -> Router<Arc<AppState>> {
    let router = Router::new()
        .route("/api/connect", post(connect))
        .route("/api/disconnect", post(disconnect))
        .route("/api/switchdb", post(switch_database))
        .route("/api/connection", get(connection));

    match mode {
        StoreMode::Sessions => router.route("/api/sessions", get(sessions)),
        StoreMode::Single => router,
    }
}

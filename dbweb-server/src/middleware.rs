//! Connection gate middleware
//!
//! Runs before every `/api` handler. Admitted requests carry their
//! `Arc<ConnectionHandle>` in the request extensions.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use dbweb_core::GateDecision;

use crate::error::ApiError;
use crate::extractors::SessionId;
use crate::state::AppState;

pub async fn require_connection(
    State(state): State<Arc<AppState>>,
    session: SessionId,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request.uri().path().to_string();

    match state.gate.check(&path, session.as_deref()) {
        Ok(GateDecision::Skipped) => {}
        Ok(GateDecision::Admitted(handle)) => {
            request.extensions_mut().insert(handle);
        }
        Err(rejection) => {
            tracing::debug!(%path, %rejection, "request rejected by gate");
            return Err(rejection.into());
        }
    }

    Ok(next.run(request).await)
}

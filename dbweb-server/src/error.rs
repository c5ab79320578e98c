//! API error types with IntoResponse
//!
//! Errors are converted to JSON responses with appropriate status codes.
//! Gate rejections and connection failures are request-level problems and
//! map to 400, never to a server failure.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use dbweb_core::{ConnectError, EstablishError, Rejection};

/// API error type with automatic HTTP status mapping
#[derive(Debug)]
pub enum ApiError {
    /// Gate or store refused the request (400)
    Rejected(Rejection),

    /// Connection could not be established (400)
    Connect(ConnectError),

    /// Malformed request body (400)
    Validation { message: String },

    /// Operation disabled by configuration (403)
    Forbidden { reason: String },

    /// Route not available in this mode (404)
    NotFound { resource: &'static str },

    /// Internal error (500)
    Internal { message: String },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Rejected(rejection) => {
                let code = match rejection {
                    Rejection::NotConnected => "not_connected",
                    Rejection::SessionRequired => "session_required",
                };
                (
                    StatusCode::BAD_REQUEST,
                    json!({
                        "error": code,
                        "message": rejection.to_string()
                    }),
                )
            }
            Self::Connect(e) => {
                tracing::debug!(error = %e, "connection attempt failed");
                (
                    StatusCode::BAD_REQUEST,
                    json!({
                        "error": "connection_error",
                        "message": e.to_string()
                    }),
                )
            }
            Self::Validation { message } => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "validation_error",
                    "message": message
                }),
            ),
            Self::Forbidden { reason } => (
                StatusCode::FORBIDDEN,
                json!({
                    "error": "forbidden",
                    "message": reason
                }),
            ),
            Self::NotFound { resource } => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": "not_found",
                    "message": format!("{} not available", resource)
                }),
            ),
            Self::Internal { message } => {
                tracing::error!("Internal error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "internal_error",
                        "message": "an internal error occurred"
                    }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<Rejection> for ApiError {
    fn from(e: Rejection) -> Self {
        Self::Rejected(e)
    }
}

impl From<ConnectError> for ApiError {
    fn from(e: ConnectError) -> Self {
        Self::Connect(e)
    }
}

/// Per-request establishment: deferring is not an option for a request,
/// so both outcomes surface as a connection error.
impl From<EstablishError> for ApiError {
    fn from(e: EstablishError) -> Self {
        Self::Connect(e.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn rejection_is_400_with_code() {
        let response = ApiError::Rejected(Rejection::SessionRequired).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "session_required");
        assert_eq!(json["message"], "session id is required");
    }

    #[tokio::test]
    async fn deferred_establishment_is_request_error() {
        let err = EstablishError::defer(ConnectError::ConnectionRefused("refused".into()));
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn forbidden_is_403() {
        let err = ApiError::Forbidden {
            reason: "session is locked".into(),
        };
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn internal_hides_message() {
        let response = ApiError::Internal {
            message: "secret detail".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(!String::from_utf8_lossy(&body).contains("secret detail"));
    }
}

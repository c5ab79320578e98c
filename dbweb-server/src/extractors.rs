//! Custom Axum extractors

use std::convert::Infallible;

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::Deserialize;

/// Header carrying the session id
pub const SESSION_HEADER: &str = "x-session-id";

/// Session id from the `x-session-id` header, else the `_session_id` query
/// parameter. Absent (or empty) is `None`; the gate decides whether that
/// matters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionId(pub Option<String>);

impl SessionId {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[derive(Deserialize)]
struct SessionQuery {
    #[serde(rename = "_session_id")]
    session_id: Option<String>,
}

impl<S> FromRequestParts<S> for SessionId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let from_header = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        if from_header.is_some() {
            return Ok(Self(from_header));
        }

        let from_query = Query::<SessionQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.session_id)
            .filter(|id| !id.is_empty());

        Ok(Self(from_query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> SessionId {
        let (mut parts, _) = request.into_parts();
        SessionId::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn header_wins() {
        let request = Request::builder()
            .uri("/api/objects?_session_id=from-query")
            .header(SESSION_HEADER, "from-header")
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.as_deref(), Some("from-header"));
    }

    #[tokio::test]
    async fn query_fallback() {
        let request = Request::builder()
            .uri("/api/objects?limit=5&_session_id=abc")
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn empty_is_absent() {
        let request = Request::builder()
            .uri("/api/objects?_session_id=")
            .header(SESSION_HEADER, "  ")
            .body(())
            .unwrap();
        assert_eq!(extract(request).await, SessionId(None));
    }
}

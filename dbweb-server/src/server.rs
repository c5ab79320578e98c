//! Axum server setup
//!
//! Server skeleton with:
//! - Connection gate on every `/api` route
//! - Optional CORS and URL prefix
//! - Tracing middleware
//! - Graceful shutdown on SIGTERM/Ctrl+C

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use dbweb_core::PrometheusMetrics;

use crate::middleware::require_connection;
use crate::routes;
use crate::state::AppState;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:8081)
    pub bind_addr: SocketAddr,

    /// URL prefix all routes are mounted under, e.g. `/dbweb`
    pub prefix: Option<String>,

    /// Allowed CORS origin; `*` allows any. `None` disables CORS.
    pub cors_origin: Option<String>,

    /// Serve `/metrics` on the main listener
    pub serve_metrics: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8081)),
            prefix: None,
            cors_origin: None,
            serve_metrics: false,
        }
    }
}

/// Build the application router.
pub fn build_router(state: Arc<AppState>, config: &ServerConfig) -> Result<Router, ServerError> {
    let api = Router::new()
        .merge(routes::info::router())
        .merge(routes::connection::router(state.store().mode()))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_connection,
        ));

    let mut app = Router::new().merge(routes::health::router()).merge(api);
    if config.serve_metrics {
        app = app.merge(routes::metrics::router());
    }
    let app = app.with_state(state);

    let mut app = match config.prefix.as_deref().filter(|p| !p.is_empty() && *p != "/") {
        Some(prefix) => Router::new().nest(prefix, app),
        None => app,
    };

    if let Some(origin) = config.cors_origin.as_deref() {
        app = app.layer(cors_layer(origin)?);
    }

    Ok(app.layer(TraceLayer::new_for_http()))
}

fn cors_layer(origin: &str) -> Result<CorsLayer, ServerError> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origin == "*" {
        tracing::warn!("CORS: all origins allowed");
        return Ok(layer.allow_origin(Any));
    }

    let value = HeaderValue::from_str(origin)
        .map_err(|_| ServerError::InvalidCorsOrigin(origin.to_string()))?;
    Ok(layer.allow_origin(value))
}

/// Run the HTTP server until `shutdown` resolves.
///
/// # Example
///
/// ```ignore
/// let state = Arc::new(AppState::new(store, establisher));
/// run_server(state, ServerConfig::default(), shutdown_signal()).await?;
/// ```
pub async fn run_server<F>(
    state: Arc<AppState>,
    config: ServerConfig,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state, &config)?;

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!(
        prefix = config.prefix.as_deref().unwrap_or(""),
        "Server listening on {}",
        config.bind_addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Serve `/metrics` on its own listener until `shutdown` resolves.
pub async fn run_metrics_server<F>(
    addr: SocketAddr,
    metrics: PrometheusMetrics,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = routes::metrics::standalone(metrics);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Metrics listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}

/// Server error type
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid CORS origin: {0}")]
    InvalidCorsOrigin(String),
}

//! dbweb-server: HTTP layer for the dbweb connection manager
//!
//! Axum server with:
//! - Request gate in front of every `/api` route
//! - Connect, disconnect and switch-database endpoints
//! - Health and Prometheus endpoints
//! - Graceful shutdown

pub mod error;
pub mod extractors;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use extractors::SessionId;
pub use server::{build_router, run_metrics_server, run_server, shutdown_signal, ServerConfig, ServerError};
pub use state::{AppState, ConnectSettings};

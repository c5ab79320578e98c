//! Structured error types for the dbweb connection core.
//!
//! Connection failures are classified up front so the establisher can
//! decide between retrying, deferring and aborting without re-inspecting
//! driver errors.

use std::time::Duration;

use thiserror::Error;

/// Failure to open or test a backend connection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// Server not reachable (nothing listening, or refused)
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// Credentials rejected by the server
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Requested database is absent on the server
    #[error("database does not exist: {0}")]
    DatabaseNotExist(String),

    /// Connection could not be opened within the configured open timeout
    #[error("connection timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Connection parameters could not be turned into driver options
    #[error("invalid connection parameters: {0}")]
    InvalidParams(String),

    /// Anything the classifier does not recognize
    #[error("{0}")]
    Other(String),
}

impl ConnectError {
    /// Server unreachable; the only condition the establisher retries.
    pub fn is_connection_refused(&self) -> bool {
        matches!(self, Self::ConnectionRefused(_))
    }

    /// Conditions that are tolerated when running on implicit parameters.
    pub fn is_deferrable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionRefused(_) | Self::AuthenticationFailed(_) | Self::DatabaseNotExist(_)
        )
    }

    /// Classify a free-form driver message.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if lower.contains("connection refused") {
            Self::ConnectionRefused(message)
        } else if lower.contains("authentication failed") {
            Self::AuthenticationFailed(message)
        } else if lower.contains("database") && lower.contains("does not exist") {
            Self::DatabaseNotExist(message)
        } else {
            Self::Other(message)
        }
    }
}

impl From<sqlx::Error> for ConnectError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
                Self::ConnectionRefused(io.to_string())
            }
            sqlx::Error::Database(db) => match db.code().as_deref() {
                // invalid_password, invalid_authorization_specification
                Some("28P01") | Some("28000") => Self::AuthenticationFailed(db.message().to_string()),
                // invalid_catalog_name
                Some("3D000") => Self::DatabaseNotExist(db.message().to_string()),
                _ => Self::from_message(db.message()),
            },
            sqlx::Error::Configuration(e) => Self::InvalidParams(e.to_string()),
            _ => Self::from_message(err.to_string()),
        }
    }
}

/// What the caller should do after establishment failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Keep running without a live connection
    Defer,
    /// Stop: fatal at startup, request error per session
    Abort,
}

/// Establishment failure, carrying the classified cause
#[derive(Error, Debug, Clone)]
#[error("{source}")]
pub struct EstablishError {
    pub action: FailureAction,
    pub source: ConnectError,
}

impl EstablishError {
    pub fn defer(source: ConnectError) -> Self {
        Self {
            action: FailureAction::Defer,
            source,
        }
    }

    pub fn abort(source: ConnectError) -> Self {
        Self {
            action: FailureAction::Abort,
            source,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.action == FailureAction::Abort
    }
}

/// Request-time refusal produced by the gate and the connection stores
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No handle exists for the requesting context
    #[error("not connected")]
    NotConnected,

    /// Multi-session mode but the request carried no session id
    #[error("session id is required")]
    SessionRequired,
}

/// Session registry misuse
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("session id cannot be empty")]
    EmptyId,
}

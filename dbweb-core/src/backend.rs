//! Backend connection trait and implementations
//!
//! Provides traits for opening and operating one native connection, with:
//! - Real implementation over a single sqlx `PgConnection`
//! - Mock implementation for testing
//! - Open timeout enforcement

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::{Connection, PgConnection};
use tokio::sync::Mutex as AsyncMutex;

use crate::error::ConnectError;
use crate::lock;
use crate::params::ConnectionParams;

/// One live native connection
#[async_trait]
pub trait Backend: Send + Sync {
    /// Round-trip to the server to prove the connection works.
    async fn ping(&self) -> Result<(), ConnectError>;

    /// Server version banner.
    async fn server_version(&self) -> Result<String, ConnectError>;

    /// Close the native connection. Called at most once per backend.
    async fn close(&self) -> Result<(), ConnectError>;
}

/// Opens native connections (testable)
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn Backend>, ConnectError>;
}

/// Real connector using a dedicated `PgConnection` per handle
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn Backend>, ConnectError> {
        let options = params.to_connect_options()?;

        let conn = if params.open_timeout.is_zero() {
            PgConnection::connect_with(&options).await?
        } else {
            tokio::time::timeout(params.open_timeout, PgConnection::connect_with(&options))
                .await
                .map_err(|_| ConnectError::Timeout(params.open_timeout))??
        };

        Ok(Box::new(PgBackend::new(conn)))
    }
}

/// A single sqlx connection behind an async mutex
pub struct PgBackend {
    conn: AsyncMutex<Option<PgConnection>>,
}

impl PgBackend {
    pub fn new(conn: PgConnection) -> Self {
        Self {
            conn: AsyncMutex::new(Some(conn)),
        }
    }
}

fn closed() -> ConnectError {
    ConnectError::Other("connection is closed".to_string())
}

#[async_trait]
impl Backend for PgBackend {
    async fn ping(&self) -> Result<(), ConnectError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(closed)?;
        conn.ping().await?;
        Ok(())
    }

    async fn server_version(&self) -> Result<String, ConnectError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(closed)?;
        let version: String = sqlx::query_scalar("SELECT version()")
            .fetch_one(conn)
            .await?;
        Ok(version)
    }

    async fn close(&self) -> Result<(), ConnectError> {
        let conn = self.conn.lock().await.take();
        match conn {
            Some(conn) => conn.close().await.map_err(ConnectError::from),
            None => Ok(()),
        }
    }
}

/// Counters shared between a [`MockBackend`] and the test observing it
#[derive(Debug, Default)]
pub struct MockProbe {
    pings: AtomicUsize,
    closes: AtomicUsize,
    fail_close: AtomicBool,
}

impl MockProbe {
    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Make every later close report an error (the close is still counted).
    pub fn fail_close(&self) {
        self.fail_close.store(true, Ordering::SeqCst);
    }
}

/// Mock backend for testing
#[derive(Debug, Default)]
pub struct MockBackend {
    probe: Arc<MockProbe>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> Arc<MockProbe> {
        Arc::clone(&self.probe)
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn ping(&self) -> Result<(), ConnectError> {
        self.probe.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn server_version(&self) -> Result<String, ConnectError> {
        Ok("PostgreSQL 16.0 (mock)".to_string())
    }

    async fn close(&self) -> Result<(), ConnectError> {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        if self.probe.fail_close.load(Ordering::SeqCst) {
            return Err(ConnectError::Other("mock close failure".to_string()));
        }
        Ok(())
    }
}

/// Mock connector for testing.
///
/// Each `connect` consumes the next scripted outcome; once the script is
/// exhausted every attempt succeeds.
#[derive(Debug, Default)]
pub struct MockConnector {
    outcomes: Mutex<VecDeque<Result<(), ConnectError>>>,
    attempts: AtomicUsize,
    opened: Mutex<Vec<Arc<MockProbe>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next attempt
    pub fn fail_next(&self, err: ConnectError) {
        lock(&self.outcomes).push_back(Err(err));
    }

    /// Queue a success for the next attempt
    pub fn succeed_next(&self) {
        lock(&self.outcomes).push_back(Ok(()));
    }

    /// Number of connect attempts so far
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Probes for every backend this connector handed out, in order
    pub fn opened(&self) -> Vec<Arc<MockProbe>> {
        lock(&self.opened).clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _params: &ConnectionParams) -> Result<Box<dyn Backend>, ConnectError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let outcome = lock(&self.outcomes).pop_front().unwrap_or(Ok(()));
        outcome?;

        let backend = MockBackend::new();
        lock(&self.opened).push(backend.probe());
        Ok(Box::new(backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_connector_follows_script() {
        let connector = MockConnector::new();
        connector.fail_next(ConnectError::ConnectionRefused("down".into()));
        connector.succeed_next();

        let params = ConnectionParams::default();
        assert!(connector.connect(&params).await.is_err());
        assert!(connector.connect(&params).await.is_ok());
        assert!(connector.connect(&params).await.is_ok());

        assert_eq!(connector.attempts(), 3);
        assert_eq!(connector.opened().len(), 2);
    }

    #[tokio::test]
    async fn mock_backend_counts_closes() {
        let backend = MockBackend::new();
        let probe = backend.probe();
        probe.fail_close();

        assert!(backend.close().await.is_err());
        assert_eq!(probe.closes(), 1);
    }

    // Integration tests require a real database
    // Run with: DATABASE_URL=postgres://... cargo test -p dbweb-core -- --ignored

    #[tokio::test]
    #[ignore = "requires database"]
    async fn pg_connector_opens_and_closes() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let backend = PgConnector
            .connect(&ConnectionParams::from_url(url))
            .await
            .expect("connect failed");

        backend.ping().await.expect("ping failed");
        assert!(backend.server_version().await.unwrap().contains("PostgreSQL"));
        backend.close().await.expect("close failed");
        assert!(backend.ping().await.is_err());
    }

    #[tokio::test]
    async fn pg_connector_refused() {
        // Port 1 is privileged and never runs PostgreSQL
        let params = ConnectionParams::from_url("postgres://dbweb@127.0.0.1:1/dbweb");
        let err = match PgConnector.connect(&params).await {
            Ok(_) => panic!("connect to port 1 succeeded"),
            Err(err) => err,
        };
        assert!(err.is_connection_refused(), "unexpected error: {err:?}");
    }
}

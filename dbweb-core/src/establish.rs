//! Connection establisher with bounded retry
//!
//! With implicit parameters (no database or url requested) refused, auth
//! and missing-database failures defer the connection on the first attempt.
//! Otherwise only "connection refused" is retried, and anything left over
//! aborts.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::backend::Connector;
use crate::error::{ConnectError, EstablishError};
use crate::handle::ConnectionHandle;
use crate::params::ConnectionParams;

/// Default delay between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

#[derive(Clone)]
pub struct Establisher {
    connector: Arc<dyn Connector>,
    retry_count: u32,
    retry_delay: Duration,
}

impl Establisher {
    pub fn new(connector: Arc<dyn Connector>, retry_count: u32, retry_delay: Duration) -> Self {
        Self {
            connector,
            retry_count,
            retry_delay,
        }
    }

    /// Single attempt, no retries
    pub fn without_retry(connector: Arc<dyn Connector>) -> Self {
        Self::new(connector, 0, DEFAULT_RETRY_DELAY)
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Open and test a connection, retrying while the server refuses.
    pub async fn establish(
        &self,
        params: &ConnectionParams,
    ) -> Result<ConnectionHandle, EstablishError> {
        let mut remaining = self.retry_count;

        loop {
            let err = match self.attempt(params).await {
                Ok(handle) => return Ok(handle),
                Err(err) => err,
            };

            if params.is_implicit() && err.is_deferrable() {
                debug!(error = %err, "no connection with default parameters, continuing without one");
                return Err(EstablishError::defer(err));
            }

            if err.is_connection_refused() && remaining > 0 {
                warn!(
                    error = %err,
                    remaining,
                    delay_secs = self.retry_delay.as_secs_f64(),
                    "connection error, retrying"
                );
                remaining -= 1;
                tokio::time::sleep(self.retry_delay).await;
                continue;
            }

            return Err(EstablishError::abort(err));
        }
    }

    async fn attempt(&self, params: &ConnectionParams) -> Result<ConnectionHandle, ConnectError> {
        let backend = self.connector.connect(params).await?;
        let handle = ConnectionHandle::new(backend, params.clone());

        if let Err(err) = handle.test().await {
            // Never hand out or leak a connection that failed its test
            if let Err(close_err) = handle.close().await {
                debug!(error = %close_err, "failed to close untested connection");
            }
            return Err(err);
        }

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockConnector;
    use crate::error::FailureAction;
    use tokio::time::Instant;

    const DELAY: Duration = Duration::from_secs(3);

    fn explicit() -> ConnectionParams {
        ConnectionParams::from_url("postgres://bob@db/app")
    }

    fn implicit() -> ConnectionParams {
        ConnectionParams {
            host: Some("localhost".into()),
            user: Some("bob".into()),
            ..ConnectionParams::default()
        }
    }

    fn refused() -> ConnectError {
        ConnectError::ConnectionRefused("connection refused".into())
    }

    #[tokio::test(start_paused = true)]
    async fn retries_refused_then_succeeds() {
        let connector = Arc::new(MockConnector::new());
        connector.fail_next(refused());
        connector.fail_next(refused());

        let establisher = Establisher::new(connector.clone(), 2, DELAY);
        let start = Instant::now();
        let handle = establisher.establish(&explicit()).await.expect("third attempt succeeds");

        assert_eq!(connector.attempts(), 3);
        assert_eq!(start.elapsed(), DELAY * 2);
        assert!(!handle.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_abort() {
        let connector = Arc::new(MockConnector::new());
        for _ in 0..3 {
            connector.fail_next(refused());
        }

        let establisher = Establisher::new(connector.clone(), 2, DELAY);
        let err = establisher.establish(&explicit()).await.unwrap_err();

        assert_eq!(err.action, FailureAction::Abort);
        assert!(err.source.is_connection_refused());
        assert_eq!(connector.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn no_retries_refused_explicit_is_fatal() {
        let connector = Arc::new(MockConnector::new());
        connector.fail_next(refused());

        let start = Instant::now();
        let err = Establisher::without_retry(connector.clone())
            .establish(&explicit())
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(connector.attempts(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn no_retries_refused_implicit_defers() {
        let connector = Arc::new(MockConnector::new());
        connector.fail_next(refused());

        let err = Establisher::without_retry(connector.clone())
            .establish(&implicit())
            .await
            .unwrap_err();

        assert_eq!(err.action, FailureAction::Defer);
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn implicit_refused_defers_without_retrying() {
        let connector = Arc::new(MockConnector::new());
        for _ in 0..3 {
            connector.fail_next(refused());
        }

        let start = Instant::now();
        let err = Establisher::new(connector.clone(), 2, DELAY)
            .establish(&implicit())
            .await
            .unwrap_err();

        assert_eq!(err.action, FailureAction::Defer);
        assert_eq!(connector.attempts(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn auth_and_missing_db_defer_only_when_implicit() {
        for err in [
            ConnectError::AuthenticationFailed("bad password".into()),
            ConnectError::DatabaseNotExist("no such db".into()),
        ] {
            let connector = Arc::new(MockConnector::new());
            connector.fail_next(err.clone());
            let outcome = Establisher::new(connector.clone(), 5, DELAY)
                .establish(&implicit())
                .await
                .unwrap_err();
            assert_eq!(outcome.action, FailureAction::Defer);
            // Never retried
            assert_eq!(connector.attempts(), 1);

            let connector = Arc::new(MockConnector::new());
            connector.fail_next(err);
            let outcome = Establisher::new(connector.clone(), 5, DELAY)
                .establish(&explicit())
                .await
                .unwrap_err();
            assert_eq!(outcome.action, FailureAction::Abort);
            assert_eq!(connector.attempts(), 1);
        }
    }

    #[tokio::test]
    async fn other_errors_abort_even_when_implicit() {
        let connector = Arc::new(MockConnector::new());
        connector.fail_next(ConnectError::Other("tls handshake failed".into()));

        let err = Establisher::new(connector, 3, DELAY)
            .establish(&implicit())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn success_tests_connection() {
        let connector = Arc::new(MockConnector::new());
        let handle = Establisher::without_retry(connector.clone())
            .establish(&explicit())
            .await
            .unwrap();

        assert_eq!(connector.opened()[0].pings(), 1);
        assert_eq!(handle.params(), &explicit());
    }
}

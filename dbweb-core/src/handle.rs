//! Connection handle: one live backend connection plus its activity clock

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::backend::Backend;
use crate::error::ConnectError;
use crate::metrics::MetricsSink;
use crate::params::ConnectionParams;

/// Owned wrapper around one live database connection.
///
/// Shared as `Arc<ConnectionHandle>`; the registry only ever replaces or
/// removes map entries, never a handle it already gave out.
pub struct ConnectionHandle {
    backend: Box<dyn Backend>,
    params: ConnectionParams,
    /// Unix milliseconds of the last successful activity
    last_activity: AtomicI64,
    closed: AtomicBool,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("target", &self.params.redacted())
            .field("last_activity", &self.last_activity())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ConnectionHandle {
    pub fn new(backend: Box<dyn Backend>, params: ConnectionParams) -> Self {
        Self {
            backend,
            params,
            last_activity: AtomicI64::new(Utc::now().timestamp_millis()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Health check against the server. Refreshes activity on success.
    pub async fn test(&self) -> Result<(), ConnectError> {
        self.backend.ping().await?;
        self.touch();
        Ok(())
    }

    /// Server version banner. Counts as a query: refreshes activity and
    /// bumps the query counter.
    pub async fn server_version(&self, metrics: &dyn MetricsSink) -> Result<String, ConnectError> {
        let version = self.backend.server_version().await?;
        self.touch();
        metrics.increment_query_count();
        Ok(version)
    }

    /// Record activity now.
    pub fn touch(&self) {
        self.touch_at(Utc::now());
    }

    /// Record activity at an explicit instant.
    pub fn touch_at(&self, at: DateTime<Utc>) {
        self.last_activity.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_activity.load(Ordering::SeqCst)).unwrap_or_default()
    }

    /// Time since the last activity, zero if `now` is earlier.
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        let idle_ms = now.timestamp_millis() - self.last_activity.load(Ordering::SeqCst);
        Duration::from_millis(u64::try_from(idle_ms).unwrap_or(0))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the underlying connection. Only the first call reaches the backend.
    pub async fn close(&self) -> Result<(), ConnectError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.backend.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use chrono::TimeDelta;

    fn handle() -> (ConnectionHandle, std::sync::Arc<crate::backend::MockProbe>) {
        let backend = MockBackend::new();
        let probe = backend.probe();
        (
            ConnectionHandle::new(Box::new(backend), ConnectionParams::default()),
            probe,
        )
    }

    #[tokio::test]
    async fn close_reaches_backend_once() {
        let (handle, probe) = handle();
        handle.close().await.unwrap();
        handle.close().await.unwrap();

        assert!(handle.is_closed());
        assert_eq!(probe.closes(), 1);
    }

    #[tokio::test]
    async fn test_refreshes_activity() {
        let (handle, probe) = handle();
        let past = Utc::now() - TimeDelta::minutes(10);
        handle.touch_at(past);

        handle.test().await.unwrap();

        assert_eq!(probe.pings(), 1);
        assert!(handle.last_activity() > past);
    }

    #[tokio::test]
    async fn server_version_counts_as_query() {
        let (handle, _) = handle();
        let metrics = crate::metrics::PrometheusMetrics::new().unwrap();
        let past = Utc::now() - TimeDelta::minutes(10);
        handle.touch_at(past);

        let version = handle.server_version(&metrics).await.unwrap();

        assert!(version.contains("PostgreSQL"));
        assert!(handle.last_activity() > past);
        assert!(metrics.render().unwrap().contains("dbweb_queries_count 1"));
    }

    #[test]
    fn idle_for_measures_from_last_activity() {
        let (handle, _) = handle();
        let now = Utc::now();
        handle.touch_at(now - TimeDelta::seconds(90));

        assert_eq!(handle.idle_for(now), Duration::from_secs(90));
        // Clock skew never yields a negative idle time
        assert_eq!(handle.idle_for(now - TimeDelta::minutes(5)), Duration::ZERO);
    }
}

//! Observability sink updated by the connection core
//!
//! The core only pushes values; exporting them is the HTTP layer's job.

use std::time::Instant;

use chrono::Utc;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Fire-and-forget metric updates. Never blocks, never errors.
pub trait MetricsSink: Send + Sync {
    fn set_session_count(&self, count: usize);
    fn increment_query_count(&self);
    fn set_healthy(&self, healthy: bool);
}

/// Sink that drops every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn set_session_count(&self, _count: usize) {}
    fn increment_query_count(&self) {}
    fn set_healthy(&self, _healthy: bool) {}
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("metrics output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Prometheus-backed sink with its own registry
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    sessions: IntGauge,
    queries: IntCounter,
    healthy: IntGauge,
    uptime: IntGauge,
    started: Instant,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let sessions = IntGauge::new("dbweb_sessions_count", "Total number of database sessions")?;
        let queries = IntCounter::new("dbweb_queries_count", "Total number of queries executed")?;
        let healthy = IntGauge::new("dbweb_healthy", "Server health status")?;
        let start_time = IntGauge::new(
            "dbweb_process_start_time",
            "Server start time, seconds since unix epoch",
        )?;
        let uptime = IntGauge::new("dbweb_uptime", "Server application uptime in seconds")?;

        registry.register(Box::new(sessions.clone()))?;
        registry.register(Box::new(queries.clone()))?;
        registry.register(Box::new(healthy.clone()))?;
        registry.register(Box::new(start_time.clone()))?;
        registry.register(Box::new(uptime.clone()))?;

        start_time.set(Utc::now().timestamp());

        Ok(Self {
            registry,
            sessions,
            queries,
            healthy,
            uptime,
            started: Instant::now(),
        })
    }

    /// Text exposition of every metric, with uptime refreshed.
    pub fn render(&self) -> Result<String, MetricsError> {
        self.uptime
            .set(i64::try_from(self.started.elapsed().as_secs()).unwrap_or(i64::MAX));

        let mut buffer = vec![];
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl MetricsSink for PrometheusMetrics {
    fn set_session_count(&self, count: usize) {
        self.sessions.set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    fn increment_query_count(&self) {
        self.queries.inc();
    }

    fn set_healthy(&self, healthy: bool) {
        self.healthy.set(i64::from(healthy));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_updates() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.set_session_count(3);
        metrics.increment_query_count();
        metrics.increment_query_count();
        metrics.set_healthy(true);

        let text = metrics.render().unwrap();
        assert!(text.contains("dbweb_sessions_count 3"));
        assert!(text.contains("dbweb_queries_count 2"));
        assert!(text.contains("dbweb_healthy 1"));
        assert!(text.contains("dbweb_uptime"));
    }

    #[test]
    fn instances_do_not_collide() {
        // Each sink owns its registry, so two can coexist in one process
        assert!(PrometheusMetrics::new().is_ok());
        assert!(PrometheusMetrics::new().is_ok());
    }
}

//! Application state shared across handlers

use std::sync::Arc;
use std::time::Duration;

use dbweb_core::params::DEFAULT_OPEN_TIMEOUT;
use dbweb_core::{
    ConnectionStore, Establisher, Gate, MetricsSink, NoopMetrics, PrometheusMetrics,
};

/// Paths under the gate that need no live connection
pub const ALLOWED_PATHS: &[&str] = &["/api/info", "/api/connect"];

/// Settings applied to connections opened through the API
#[derive(Debug, Clone)]
pub struct ConnectSettings {
    /// Refuse connect and switch-database requests
    pub lock_session: bool,
    pub read_only: bool,
    pub open_timeout: Duration,
}

impl Default for ConnectSettings {
    fn default() -> Self {
        Self {
            lock_session: false,
            read_only: false,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
        }
    }
}

/// Shared application state
pub struct AppState {
    pub gate: Gate,
    pub establisher: Establisher,
    pub metrics: Arc<dyn MetricsSink>,
    /// Exported on `/metrics` when metrics are enabled
    pub prometheus: Option<PrometheusMetrics>,
    pub settings: ConnectSettings,
}

impl AppState {
    pub fn new(store: Arc<dyn ConnectionStore>, establisher: Establisher) -> Self {
        let gate = ALLOWED_PATHS
            .iter()
            .fold(Gate::new(store), |gate, path| gate.allow(*path));

        Self {
            gate,
            establisher,
            metrics: Arc::new(NoopMetrics),
            prometheus: None,
            settings: ConnectSettings::default(),
        }
    }

    /// Report to and export a Prometheus sink
    pub fn with_prometheus(mut self, metrics: PrometheusMetrics) -> Self {
        self.metrics = Arc::new(metrics.clone());
        self.prometheus = Some(metrics);
        self
    }

    pub fn with_settings(mut self, settings: ConnectSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(&self) -> &Arc<dyn ConnectionStore> {
        self.gate.store()
    }
}

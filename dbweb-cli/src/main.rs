//! dbweb - web-based PostgreSQL explorer server
//!
//! Startup and shutdown for the server:
//! - Single-connection mode: connect at startup with retry, or start
//!   disconnected when the local default database is unavailable
//! - Multi-session mode (`--sessions`): one connection per browser session,
//!   idle sessions closed by a background reaper
//! - Prometheus metrics on the main listener or a separate one

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use dbweb_core::{
    ConnectionStore, Establisher, IdleReaper, LinkState, MetricsSink, NoopMetrics, PgConnector,
    PrometheusMetrics, SessionRegistry, SingleConnection,
};
use dbweb_server::{run_metrics_server, run_server, shutdown_signal, AppState};

mod config;
mod tracing_setup;

use config::Options;
use tracing_setup::TracingConfig;

/// Connection ownership for the configured mode
enum Mode {
    Single(Arc<SingleConnection>),
    Sessions {
        registry: Arc<SessionRegistry>,
        reaper: Option<JoinHandle<()>>,
    },
}

impl Mode {
    fn store(&self) -> Arc<dyn ConnectionStore> {
        match self {
            Self::Single(single) => single.clone(),
            Self::Sessions { registry, .. } => registry.clone(),
        }
    }

    /// Close every connection once the server has stopped.
    async fn close(self) {
        match self {
            Self::Single(single) => {
                if single.disconnect().await {
                    info!("connection closed");
                }
            }
            Self::Sessions { registry, reaper } => {
                if let Some(reaper) = reaper {
                    if let Err(e) = reaper.await {
                        warn!(error = %e, "idle reaper task failed");
                    }
                }
                let closed = registry.close_all().await;
                info!(closed, "sessions closed");
            }
        }
    }
}

/// Resolves once shutdown has been requested.
async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

#[tokio::main]
async fn main() -> Result<()> {
    let loaded = config::load_dotenv();
    let options = Options::parse().normalize();
    tracing_setup::init(&TracingConfig::from(&options))?;

    for path in &loaded {
        info!("Loaded configuration from {}", path.display());
    }

    run(options).await
}

async fn run(options: Options) -> Result<()> {
    let prometheus = if options.metrics {
        Some(PrometheusMetrics::new().context("Failed to register metrics")?)
    } else {
        None
    };
    let metrics: Arc<dyn MetricsSink> = match &prometheus {
        Some(prometheus) => Arc::new(prometheus.clone()),
        None => Arc::new(NoopMetrics),
    };

    let establisher = Establisher::new(
        Arc::new(PgConnector),
        options.open_retry,
        options.open_retry_delay(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let mode = if options.sessions {
        start_sessions(&options, metrics.clone(), &shutdown_rx)
    } else {
        start_single(&options, &establisher, metrics.as_ref()).await?
    };

    let mut state =
        AppState::new(mode.store(), establisher).with_settings(options.connect_settings());
    if let Some(prometheus) = &prometheus {
        state = state.with_prometheus(prometheus.clone());
    }

    let metrics_server = match (options.metrics_addr, &prometheus) {
        (Some(addr), Some(prometheus)) => {
            let shutdown = stopped(shutdown_rx.clone());
            let prometheus = prometheus.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = run_metrics_server(addr, prometheus, shutdown).await {
                    warn!(error = %e, "metrics server failed");
                }
            }))
        }
        (Some(_), None) => {
            warn!("--metrics-addr has no effect without --metrics");
            None
        }
        _ => None,
    };

    let signal_tx = Arc::clone(&shutdown_tx);
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_tx.send_replace(true);
    });

    metrics.set_healthy(true);
    let served = run_server(
        Arc::new(state),
        options.server_config(),
        stopped(shutdown_rx.clone()),
    )
    .await;
    metrics.set_healthy(false);

    // A bind failure returns before any signal arrived.
    shutdown_tx.send_replace(true);

    if let Some(task) = metrics_server {
        let _ = task.await;
    }
    mode.close().await;

    served.context("Server error")
}

fn start_sessions(
    options: &Options,
    metrics: Arc<dyn MetricsSink>,
    shutdown: &watch::Receiver<bool>,
) -> Mode {
    let registry = Arc::new(SessionRegistry::new(metrics));

    let reaper = match options.idle_timeout() {
        Some(timeout) => {
            let reaper = IdleReaper::new(Arc::clone(&registry), timeout);
            let shutdown = stopped(shutdown.clone());
            Some(tokio::spawn(async move { reaper.run_until(shutdown).await }))
        }
        None => {
            info!("idle timeout disabled, sessions stay open until disconnected");
            None
        }
    };

    info!("multi-session mode enabled");
    Mode::Sessions { registry, reaper }
}

async fn start_single(
    options: &Options,
    establisher: &Establisher,
    metrics: &dyn MetricsSink,
) -> Result<Mode> {
    let single = Arc::new(SingleConnection::new());
    let params = options.connection_params();

    let state = single
        .connect_at_startup(establisher, &params)
        .await
        .with_context(|| format!("Failed to connect to {}", params.redacted()))?;

    match state {
        LinkState::Connected => {
            if let Some(handle) = single.get() {
                let version = handle
                    .server_version(metrics)
                    .await
                    .context("Failed to query server version")?;
                println!("Connected to {}", version);
            }
        }
        LinkState::Unconfigured | LinkState::Connecting | LinkState::Disconnected => {
            info!("no connection, waiting for /api/connect");
        }
    }

    Ok(Mode::Single(single))
}

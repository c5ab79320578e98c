//! Command-line options and `.env` loading

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use dbweb_core::params::{DEFAULT_OPEN_TIMEOUT, DEFAULT_PORT};
use dbweb_core::ConnectionParams;
use dbweb_server::{ConnectSettings, ServerConfig};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "dbweb",
    author,
    version,
    about = "Web-based PostgreSQL explorer server",
    long_about = "Serves a database explorer over HTTP. Holds one connection, or one \
                  connection per browser session with --sessions, and closes idle sessions."
)]
pub struct Options {
    /// Database connection string
    #[arg(long, env = "DBWEB_DATABASE_URL")]
    pub url: Option<String>,

    /// Server hostname or IP
    #[arg(long, env = "DBWEB_HOST", default_value = "localhost")]
    pub host: Option<String>,

    /// Server port
    #[arg(long, env = "DBWEB_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Database user
    #[arg(long, env = "DBWEB_USER")]
    pub user: Option<String>,

    /// Password for user
    #[arg(long, env = "DBWEB_PASS", hide_env_values = true)]
    pub pass: Option<String>,

    /// Database name
    #[arg(long, env = "DBWEB_DB")]
    pub db: Option<String>,

    /// SSL mode (disable, prefer, require, verify-ca, verify-full)
    #[arg(long, env = "DBWEB_SSL")]
    pub ssl: Option<String>,

    /// SSL certificate authority file
    #[arg(long = "ssl-rootcert")]
    pub ssl_rootcert: Option<String>,

    /// SSL client certificate file
    #[arg(long = "ssl-cert")]
    pub ssl_cert: Option<String>,

    /// SSL client key file
    #[arg(long = "ssl-key")]
    pub ssl_key: Option<String>,

    /// Seconds allowed for opening a connection (0 disables the limit)
    #[arg(long, default_value_t = DEFAULT_OPEN_TIMEOUT.as_secs())]
    pub open_timeout: u64,

    /// Number of retries when the server refuses the connection at startup
    #[arg(long, default_value_t = 0)]
    pub open_retry: u32,

    /// Seconds between connection retries
    #[arg(long, default_value_t = 3)]
    pub open_retry_delay: u64,

    /// Run every connection in read-only mode
    #[arg(long, env = "DBWEB_READONLY")]
    pub readonly: bool,

    /// HTTP server host
    #[arg(long, env = "DBWEB_BIND", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub bind: IpAddr,

    /// HTTP server listen port
    #[arg(long, env = "DBWEB_LISTEN", default_value_t = 8081)]
    pub listen: u16,

    /// Enable multiple database sessions
    #[arg(long, env = "DBWEB_SESSIONS")]
    pub sessions: bool,

    /// Lock session to a single database connection
    #[arg(long, env = "DBWEB_LOCK_SESSION")]
    pub lock_session: bool,

    /// URL prefix for every route
    #[arg(long, env = "DBWEB_URL_PREFIX")]
    pub prefix: Option<String>,

    /// Connection idle timeout in minutes
    #[arg(long, env = "DBWEB_IDLE_TIMEOUT", default_value_t = 180)]
    pub idle_timeout: u64,

    /// Disable connection idle timeout
    #[arg(long)]
    pub no_idle_timeout: bool,

    /// Enable Cross-Origin Resource Sharing
    #[arg(long)]
    pub cors: bool,

    /// Allowed CORS origin
    #[arg(long, default_value = "*")]
    pub cors_origin: String,

    /// Enable Prometheus metrics
    #[arg(long, env = "DBWEB_METRICS")]
    pub metrics: bool,

    /// Serve metrics on a separate address instead of the main listener
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,

    /// Logging level
    #[arg(long, env = "DBWEB_LOG_LEVEL", default_value = "info", value_parser = LOG_LEVELS)]
    pub log_level: String,

    /// Logging output format
    #[arg(long, env = "DBWEB_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Options {
    /// Apply the option interdependencies using the process environment.
    pub fn normalize(self) -> Self {
        self.normalize_with(|key| std::env::var(key).ok())
    }

    pub fn normalize_with(mut self, env: impl Fn(&str) -> Option<String>) -> Self {
        self.url = non_empty(self.url).or_else(|| non_empty(env("DATABASE_URL")));
        self.host = non_empty(self.host);
        self.user = non_empty(self.user);
        self.db = non_empty(self.db);

        let local = matches!(self.host.as_deref(), Some("localhost" | "127.0.0.1"));
        if local && self.user.is_none() {
            match non_empty(env("USER")) {
                Some(user) => self.user = Some(user),
                None => self.host = None,
            }
        }

        if self.lock_session {
            self.sessions = false;
        }

        if self.sessions {
            self.url = None;
            self.host = None;
            self.user = None;
            self.pass = None;
            self.db = None;
            self.ssl = None;
        }

        self.prefix = self.prefix.as_deref().and_then(|prefix| {
            let trimmed = prefix.trim().trim_matches('/');
            (!trimmed.is_empty()).then(|| format!("/{}", trimmed))
        });

        if self.debug {
            self.log_level = "debug".to_string();
        }

        self
    }

    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams {
            url: self.url.clone(),
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.pass.clone(),
            database: self.db.clone(),
            ssl_mode: self.ssl.clone(),
            ssl_root_cert: self.ssl_rootcert.clone(),
            ssl_cert: self.ssl_cert.clone(),
            ssl_key: self.ssl_key.clone(),
            open_timeout: self.open_timeout(),
            read_only: self.readonly,
        }
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout)
    }

    pub fn open_retry_delay(&self) -> Duration {
        Duration::from_secs(self.open_retry_delay)
    }

    /// `None` when idle sessions are never closed
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.no_idle_timeout || self.idle_timeout == 0 {
            return None;
        }
        Some(Duration::from_secs(self.idle_timeout.saturating_mul(60)))
    }

    pub fn connect_settings(&self) -> ConnectSettings {
        ConnectSettings {
            lock_session: self.lock_session,
            read_only: self.readonly,
            open_timeout: self.open_timeout(),
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_addr: SocketAddr::new(self.bind, self.listen),
            prefix: self.prefix.clone(),
            cors_origin: self.cors.then(|| self.cors_origin.clone()),
            serve_metrics: self.metrics && self.metrics_addr.is_none(),
        }
    }
}

/// Load environment variables from `.env` files.
///
/// Priority order (highest to lowest):
/// 1. Variables already set
/// 2. Current directory .env
/// 3. ~/.dbweb/.env
///
/// Returns the files that were loaded. Called before tracing is set up,
/// so the caller logs the result.
pub fn load_dotenv() -> Vec<PathBuf> {
    let mut loaded = Vec::new();

    if let Ok(path) = dotenvy::dotenv() {
        loaded.push(path);
    }

    if let Some(env_file) = config_dir().map(|dir| dir.join(".env")) {
        // dotenvy doesn't overwrite existing vars
        if env_file.exists() && dotenvy::from_path(&env_file).is_ok() {
            loaded.push(env_file);
        }
    }

    loaded
}

/// The dbweb config directory (~/.dbweb)
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".dbweb"))
}

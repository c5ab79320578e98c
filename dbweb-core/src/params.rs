//! Connection parameters supplied by configuration or a connect request

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use url::Url;

use crate::error::ConnectError;

/// Default PostgreSQL port
pub const DEFAULT_PORT: u16 = 5432;

/// Default time allowed for opening a connection
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Parameters used to open one backend connection.
///
/// A connection string in `url` takes precedence over the discrete fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionParams {
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub database: Option<String>,
    pub ssl_mode: Option<String>,
    pub ssl_root_cert: Option<String>,
    pub ssl_cert: Option<String>,
    pub ssl_key: Option<String>,
    #[serde(skip)]
    pub open_timeout: Duration,
    pub read_only: bool,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            url: None,
            host: None,
            port: DEFAULT_PORT,
            user: None,
            password: None,
            database: None,
            ssl_mode: None,
            ssl_root_cert: None,
            ssl_cert: None,
            ssl_key: None,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            read_only: false,
        }
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

impl ConnectionParams {
    /// Parameters from a connection string
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Nothing was configured: no url, host, user or database.
    pub fn is_blank(&self) -> bool {
        !present(&self.url) && !present(&self.host) && !present(&self.user) && !present(&self.database)
    }

    /// The caller did not ask for a specific database or connection string.
    ///
    /// Startup on implicit parameters tolerates an unreachable or
    /// misconfigured local server.
    pub fn is_implicit(&self) -> bool {
        !present(&self.url) && !present(&self.database)
    }

    /// Same parameters targeting another database on the same server
    pub fn with_database(&self, database: impl Into<String>) -> Self {
        let database = database.into();
        let mut next = self.clone();

        match &self.url {
            Some(url) if !url.is_empty() => {
                next.url = Some(replace_url_database(url, &database));
            }
            _ => next.database = Some(database),
        }

        next
    }

    /// Human-readable target with the password masked
    pub fn redacted(&self) -> String {
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            return redact_url(url);
        }

        let user = self.user.as_deref().unwrap_or("");
        let host = self.host.as_deref().unwrap_or("localhost");
        let database = self.database.as_deref().unwrap_or("");
        let auth = match (user.is_empty(), present(&self.password)) {
            (true, _) => String::new(),
            (false, true) => format!("{}:***@", user),
            (false, false) => format!("{}@", user),
        };

        format!("postgres://{}{}:{}/{}", auth, host, self.port, database)
    }

    /// Build driver options.
    pub fn to_connect_options(&self) -> Result<PgConnectOptions, ConnectError> {
        let mut options = match self.url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => PgConnectOptions::from_str(url)
                .map_err(|e| ConnectError::InvalidParams(e.to_string()))?,
            None => {
                let mut options = PgConnectOptions::new().port(self.port);
                if let Some(host) = self.host.as_deref().filter(|h| !h.is_empty()) {
                    options = options.host(host);
                }
                if let Some(user) = self.user.as_deref().filter(|u| !u.is_empty()) {
                    options = options.username(user);
                }
                if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
                    options = options.password(password);
                }
                if let Some(database) = self.database.as_deref().filter(|d| !d.is_empty()) {
                    options = options.database(database);
                }
                options
            }
        };

        if let Some(mode) = self.ssl_mode.as_deref().filter(|m| !m.is_empty()) {
            let mode = PgSslMode::from_str(mode)
                .map_err(|_| ConnectError::InvalidParams(format!("unknown ssl mode '{}'", mode)))?;
            options = options.ssl_mode(mode);
        }
        if let Some(path) = self.ssl_root_cert.as_deref().filter(|p| !p.is_empty()) {
            options = options.ssl_root_cert(path);
        }
        if let Some(path) = self.ssl_cert.as_deref().filter(|p| !p.is_empty()) {
            options = options.ssl_client_cert(path);
        }
        if let Some(path) = self.ssl_key.as_deref().filter(|p| !p.is_empty()) {
            options = options.ssl_client_key(path);
        }
        if self.read_only {
            options = options.options([("default_transaction_read_only", "on")]);
        }

        Ok(options)
    }
}

/// Placeholder shown for a connection string that does not parse
const UNPARSED_URL: &str = "postgres://<unparsed>";

/// Query keys that carry a secret
const SECRET_QUERY_KEYS: &[&str] = &["password"];

fn is_secret(key: &str) -> bool {
    SECRET_QUERY_KEYS.contains(&key)
}

/// Swap the path segment (database name) of a connection url, keeping any query.
///
/// An unparseable url is returned unchanged; the driver rejects it on connect.
fn replace_url_database(url: &str, database: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_path(&format!("/{}", database));
            parsed.into()
        }
        Err(_) => url.to_string(),
    }
}

/// Mask the userinfo password and any password query parameter.
fn redact_url(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return UNPARSED_URL.to_string();
    };

    if parsed.password().is_some() && parsed.set_password(Some("***")).is_err() {
        return UNPARSED_URL.to_string();
    }

    let has_secret = parsed.query_pairs().any(|(key, _)| is_secret(&key));
    if has_secret {
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(key, value)| {
                let value = if is_secret(&key) {
                    "***".to_string()
                } else {
                    value.into_owned()
                };
                (key.into_owned(), value)
            })
            .collect();
        parsed.query_pairs_mut().clear().extend_pairs(pairs);
    }

    parsed.into()
}

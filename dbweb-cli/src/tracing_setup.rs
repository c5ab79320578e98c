//! Tracing setup for the dbweb binary
//!
//! Usage:
//!   dbweb --debug ...                 # Debug logging to console
//!   dbweb --log-format json ...       # One JSON object per line
//!   RUST_LOG=dbweb_core=trace dbweb   # Fine-grained log control
//!
//! `RUST_LOG` wins over `--log-level` when set.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, Options};

/// Tracing configuration options
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    pub format: LogFormat,
    /// Show targets
    pub debug: bool,
}

impl From<&Options> for TracingConfig {
    fn from(options: &Options) -> Self {
        Self {
            level: options.log_level.clone(),
            format: options.log_format,
            debug: options.debug,
        }
    }
}

fn filter(config: &TracingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Initialize tracing with console output
pub fn init(config: &TracingConfig) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(config))
        .with_target(config.debug);

    let result = match config.format {
        LogFormat::Text => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|err| anyhow!(err))
}

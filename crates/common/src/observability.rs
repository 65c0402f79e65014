//! Logging setup for certkeeper
//!
//! All crates log through `tracing`. Binaries embedding certkeeper call
//! [`init_tracing`] once at startup.

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable selecting the log format (`json` or `pretty`)
pub const LOG_FORMAT_ENV: &str = "CERTKEEPER_LOG_FORMAT";

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured JSON, one event per line (default)
    Json,
    /// Multi-line human readable output
    Pretty,
}

impl LogFormat {
    /// Read the format from [`LOG_FORMAT_ENV`], defaulting to JSON
    pub fn from_env() -> Self {
        Self::parse(&std::env::var(LOG_FORMAT_ENV).unwrap_or_default())
    }

    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" => Self::Pretty,
            _ => Self::Json,
        }
    }
}

/// Initialize the tracing/logging subsystem
///
/// The level comes from `RUST_LOG` (default `info`). Fails if a global
/// subscriber is already installed.
pub fn init_tracing() -> Result<()> {
    let format = LogFormat::from_env();

    let json_layer = (format == LogFormat::Json).then(|| {
        fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });

    let pretty_layer = (format == LogFormat::Pretty).then(|| {
        fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
    });

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    info!(format = ?format, "Tracing initialized");
    Ok(())
}

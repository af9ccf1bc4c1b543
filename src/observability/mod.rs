//! Structured logging initialization.
//!
//! This runtime carries the teacher's logging stack (`tracing` +
//! `tracing-subscriber`) without the teacher's distributed-tracing and
//! metrics layers (OTLP export, Prometheus) — nothing here spans
//! multiple processes, so there is no trace to export and nothing to
//! scrape.

use crate::{Error, Result};
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, for interactive use.
    Pretty,
    /// One JSON object per line, for log aggregation.
    Json,
}

/// Logging initialization options.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Base filter directive, overridden by `RUST_LOG` if set.
    pub default_filter: String,
    /// Output format.
    pub format: LogFormat,
}

impl LoggingConfig {
    #[must_use]
    pub fn from_debug_mode(debug_mode: bool) -> Self {
        Self {
            default_filter: if debug_mode { "debug".to_string() } else { "info".to_string() },
            format: LogFormat::Pretty,
        }
    }
}

static INIT: OnceLock<()> = OnceLock::new();

/// Initializes the global tracing subscriber. Safe to call more than
/// once; only the first call takes effect.
///
/// # Errors
///
/// Returns an error if the subscriber fails to install (never happens
/// on the first call in a process that hasn't installed one already).
pub fn init(config: &LoggingConfig) -> Result<()> {
    if INIT.get().is_some() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
    };

    result.map_err(|e| Error::Fatal(format!("failed to initialize logging: {e}")))?;
    let _ = INIT.set(());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_mode_selects_debug_filter() {
        let config = LoggingConfig::from_debug_mode(true);
        assert_eq!(config.default_filter, "debug");
    }

    #[test]
    fn non_debug_mode_selects_info_filter() {
        let config = LoggingConfig::from_debug_mode(false);
        assert_eq!(config.default_filter, "info");
    }
}

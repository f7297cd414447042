//! Tracing subscriber setup and log-safe helpers.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// How much of a user query ends up in log lines.
pub const QUERY_LOG_LIMIT: usize = 100;

/// Installs the global subscriber. `RUST_LOG` wins over `logging.level`.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| anyhow!("invalid logging.level '{}': {}", config.level, e))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}

/// Truncates to at most `max` characters, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// The query as it may appear in logs.
pub fn query_for_log(query: &str) -> &str {
    truncate_chars(query, QUERY_LOG_LIMIT)
}

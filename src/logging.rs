//! Logging setup
//!
//! Installs the global tracing subscriber. `RUST_LOG` takes precedence over
//! the configured level.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LogFormat;

/// Level used when the configured one cannot be parsed
pub const FALLBACK_LOG_LEVEL: &str = "info";

/// Filter for a configured level, falling back to `info` on a bad directive
pub fn level_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new(FALLBACK_LOG_LEVEL))
}

/// Initialize the tracing subscriber with the given level and format
pub fn init_tracing(log_level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level_filter(log_level));

    // logs go to stderr so command output on stdout stays machine-readable
    let layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .context("Failed to install tracing subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter_accepts_directives() {
        let filter = level_filter("debug");
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn test_level_filter_falls_back() {
        let filter = level_filter("api_dispatch=loud");
        assert_eq!(filter.to_string(), FALLBACK_LOG_LEVEL);
    }
}

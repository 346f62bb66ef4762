// ABOUTME: Logging configuration and tracing subscriber setup for the sync engine
// ABOUTME: Env-driven log level and format selection (json, pretty, compact)
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

//! Structured logging setup.
//!
//! The daemon calls [`init_logging`] once at startup; library consumers are
//! expected to install their own subscriber and skip this module entirely.

use std::env;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON lines for production log shipping
    Json,
    /// Human-readable multi-line format for development
    Pretty,
    /// Single-line format for space-constrained environments
    Compact,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Pretty,
        }
    }
}

impl LoggingConfig {
    /// Build logging configuration from `WEARSYNC_LOG_*` variables
    #[must_use]
    pub fn from_env() -> Self {
        let level = env::var("WEARSYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
        let format = match env::var("WEARSYNC_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") => LogFormat::Compact,
            _ => LogFormat::Pretty,
        };
        Self { level, format }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level so operators can
/// raise verbosity per-module without redeploying.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init()?,
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init()?,
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn format_parses_from_env() {
        std::env::set_var("WEARSYNC_LOG_FORMAT", "json");
        assert_eq!(LoggingConfig::from_env().format, LogFormat::Json);
        std::env::set_var("WEARSYNC_LOG_FORMAT", "weird");
        assert_eq!(LoggingConfig::from_env().format, LogFormat::Pretty);
        std::env::remove_var("WEARSYNC_LOG_FORMAT");
    }
}

//! Logging setup for the `strata` binary.
//!
//! # Environment Variables
//!
//! - `STRATA_DEBUG=1` - Enable debug logging
//! - `STRATA_LOG_LEVEL=trace|debug|info|warn|error` - Set a specific log level
//! - `STRATA_LOG_FORMAT=json|pretty|compact` - Set the output format
//!
//! Environment variables win over the `[logging]` section of `strata.toml`.
//! Logs go to stderr so command output stays clean.

use std::env;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LoggingConfig;

/// Crates whose events are shown.
const TARGETS: &[&str] = &[
    "strata",
    "strata_cli",
    "strata_plan",
    "strata_migrate",
    "strata_postgres",
];

/// Check if `STRATA_DEBUG` asks for debug logging.
pub fn is_debug_enabled() -> bool {
    debug_flag(env::var("STRATA_DEBUG").ok().as_deref())
}

fn debug_flag(value: Option<&str>) -> bool {
    value.is_some_and(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
}

fn normalize_level(level: &str) -> Option<&'static str> {
    match level.to_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" => Some("warn"),
        "error" => Some("error"),
        _ => None,
    }
}

fn normalize_format(format: &str) -> Option<&'static str> {
    match format.to_lowercase().as_str() {
        "json" => Some("json"),
        "pretty" => Some("pretty"),
        "compact" => Some("compact"),
        _ => None,
    }
}

/// Effective log level.
///
/// `STRATA_LOG_LEVEL`, then `STRATA_DEBUG`, then the config, then `warn`.
pub fn log_level(config: &LoggingConfig) -> &'static str {
    resolve_level(
        env::var("STRATA_LOG_LEVEL").ok().as_deref(),
        is_debug_enabled(),
        config,
    )
}

fn resolve_level(env_level: Option<&str>, debug: bool, config: &LoggingConfig) -> &'static str {
    env_level
        .and_then(normalize_level)
        .or_else(|| debug.then_some("debug"))
        .or_else(|| config.level.as_deref().and_then(normalize_level))
        .unwrap_or("warn")
}

/// Effective log format; `compact` unless configured.
pub fn log_format(config: &LoggingConfig) -> &'static str {
    resolve_format(env::var("STRATA_LOG_FORMAT").ok().as_deref(), config)
}

fn resolve_format(env_format: Option<&str>, config: &LoggingConfig) -> &'static str {
    env_format
        .and_then(normalize_format)
        .or_else(|| config.format.as_deref().and_then(normalize_format))
        .unwrap_or("compact")
}

fn filter_directives(level: &str) -> String {
    TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber.
///
/// Does nothing if one is already installed.
pub fn init(config: &LoggingConfig) {
    let level = log_level(config);
    let format = log_format(config);
    let filter = EnvFilter::try_new(filter_directives(level)).unwrap_or_else(|_| EnvFilter::new("warn"));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        "json" => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        "pretty" => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
        _ => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
    };

    if installed.is_ok() {
        tracing::debug!(level, format, "Logging initialized");
    }
}

//! # troop-logging
//!
//! Installs the global `tracing` subscriber: an [`EnvFilter`] (where
//! `RUST_LOG` beats the configured level) feeding one `fmt` layer on stderr,
//! either compact text or JSON lines.

#![deny(unsafe_code)]

use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use troop_settings::{LogFormat, LoggingSettings};

/// Subscriber installation failures.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The level directive did not parse.
    #[error("invalid log filter {directive:?}: {reason}")]
    InvalidFilter {
        /// The offending directive string.
        directive: String,
        /// Parser message.
        reason: String,
    },
    /// A global subscriber is already set.
    #[error("tracing subscriber already installed")]
    AlreadyInitialized,
}

/// Build the level filter. A valid `rust_log` wins over `level`.
pub fn filter_from(rust_log: Option<&str>, level: &str) -> Result<EnvFilter, LoggingError> {
    if let Some(filter) = rust_log.and_then(|directive| EnvFilter::try_new(directive).ok()) {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|e| LoggingError::InvalidFilter {
        directive: level.to_owned(),
        reason: e.to_string(),
    })
}

/// Install the global subscriber described by `settings`.
pub fn init_subscriber(settings: &LoggingSettings) -> Result<(), LoggingError> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = filter_from(rust_log.as_deref(), &settings.level)?;

    let (pretty, json) = match settings.format {
        LogFormat::Pretty => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)
}

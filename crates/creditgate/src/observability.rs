//! Logging setup for applications embedding the limiter.
//!
//! The limiter crates only emit `tracing` events and spans; nothing is printed
//! until the application installs a subscriber. [`init_logging`] installs the
//! usual one: an environment filter plus a text or JSON formatter on stdout.

use std::env;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Configuration for the global log subscriber.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Service name recorded when logging starts
    pub service_name: String,
    /// Log level filter (e.g., "info", "creditgate_rate_limit=debug")
    pub log_level: String,
    /// Enable JSON-formatted logs for structured logging
    pub json_logs: bool,
    /// Include the event target (module path) in each line
    pub with_target: bool,
}

impl LoggingConfig {
    /// Create a new configuration with the given service name.
    ///
    /// The level comes from `RUST_LOG`, falling back to `info`.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            json_logs: false,
            with_target: true,
        }
    }

    /// Set the log level.
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable JSON-formatted logs.
    pub fn with_json_logs(mut self, enabled: bool) -> Self {
        self.json_logs = enabled;
        self
    }

    /// Show or hide event targets.
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_NAME"))
    }
}

/// Install the global subscriber with default configuration.
///
/// For more control, use [`init_logging_with_config`].
///
/// # Errors
///
/// Fails if the level filter does not parse or a global subscriber is
/// already installed.
pub fn init_logging() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_logging_with_config(LoggingConfig::default())
}

/// Install the global subscriber with custom configuration.
///
/// `RUST_LOG`, when set, takes precedence over `config.log_level`.
///
/// # Errors
///
/// Fails if the level filter does not parse or a global subscriber is
/// already installed.
pub fn init_logging_with_config(
    config: LoggingConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let fmt_layer = if config.json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(config.with_target)
            .with_level(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(config.with_target)
            .with_level(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    tracing::debug!(
        service = %config.service_name,
        json = config.json_logs,
        "Logging initialized"
    );
    Ok(())
}

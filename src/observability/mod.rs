//! Observability Infrastructure
//!
//! Structured logging and request metrics. Application code uses standard
//! `tracing` macros; [`init`] installs the subscriber that turns each event
//! into one JSON line on stdout.
//!
//! # Modules
//!
//! - **Runtime configuration**: [`ObservabilityConfig`] for initializing logging at startup
//! - **[`metrics`]**: metric registry, request instrumentation and Prometheus export
//!
//! # Usage
//!
//! ```ignore
//! use myapp::observability::{ObservabilityConfig, init};
//!
//! // From environment variables
//! let config = ObservabilityConfig::from_env();
//! init(&config)?;
//!
//! tracing::info!(version = "1.0.0", app = "myapp", "Application starting");
//! ```

mod config;
mod logger;
pub mod metrics;
mod providers;

pub use config::{LogFormat, ObservabilityConfig, ObservabilityConfigBuilder};
pub use logger::{JsonLogFormat, LogRecord};

#[cfg(test)]
pub(crate) use logger::capture;

use tracing::info;

/// Initialize logging.
///
/// This must be called once at application startup, before any request is
/// served. A second call returns [`ObservabilityError::Provider`].
///
/// # Errors
///
/// Returns an error if:
/// - The log filter directive is invalid
/// - A global subscriber is already installed
pub fn init(config: &ObservabilityConfig) -> Result<(), ObservabilityError> {
    providers::init_tracing(config)?;

    info!(
        log_format = %config.log_format,
        log_filter = %config.log_filter,
        "Observability initialized"
    );

    Ok(())
}

/// Observability initialization errors
#[derive(Debug)]
pub enum ObservabilityError {
    /// Invalid configuration
    Config(String),
    /// Provider initialization failed
    Provider(String),
}

impl std::fmt::Display for ObservabilityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Observability config error: {}", msg),
            Self::Provider(msg) => write!(f, "Provider error: {}", msg),
        }
    }
}

impl std::error::Error for ObservabilityError {}

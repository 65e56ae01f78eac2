//! Provider Implementations
//!
//! Initializes the tracing subscriber based on configuration.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::logger::JsonLogFormat;
use super::{LogFormat, ObservabilityConfig, ObservabilityError};

/// Initialize the tracing subscriber based on configuration.
///
/// All formats write to stdout, one event per write.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), ObservabilityError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .map_err(|e| ObservabilityError::Config(format!("Invalid log filter: {}", e)))?;

    let subscriber = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => {
            subscriber
                .with(
                    fmt::layer()
                        .event_format(JsonLogFormat)
                        .with_writer(std::io::stdout),
                )
                .try_init()
                .map_err(|e| ObservabilityError::Provider(format!("Failed to init tracing: {}", e)))?;
        }
        LogFormat::Pretty => {
            subscriber
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_file(true)
                        .with_line_number(true),
                )
                .try_init()
                .map_err(|e| ObservabilityError::Provider(format!("Failed to init tracing: {}", e)))?;
        }
        LogFormat::Compact => {
            subscriber
                .with(fmt::layer().compact().with_target(true))
                .try_init()
                .map_err(|e| ObservabilityError::Provider(format!("Failed to init tracing: {}", e)))?;
        }
    }

    Ok(())
}

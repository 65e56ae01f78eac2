//! # myapp
//!
//! HTTP service that instruments every request with Prometheus metrics and
//! a structured JSON log record, and exposes the metrics for scraping.
//!
//! ## Features
//!
//! - **Metric registry**: counters, gauges and histograms keyed by label values
//! - **Request instrumentation**: request counts, durations, errors and in-flight gauge
//! - **Prometheus export**: text exposition format at `/metrics`
//! - **Structured logging**: one JSON object per line on stdout
//!
//! ## Quick Start
//!
//! ```ignore
//! use myapp::{build_app, AppConfig, AppState};
//! use myapp::observability::{ObservabilityConfig, init};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     init(&ObservabilityConfig::from_env())?;
//!
//!     let config = AppConfig::from_env();
//!     let state = AppState::new(config.clone())?;
//!     state.on_startup()?;
//!
//!     let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
//!     axum::serve(listener, build_app(state)).await?;
//!     Ok(())
//! }
//! ```

mod app;
mod config;
pub mod error;
mod health;
pub mod observability;
mod parse;

// Re-exports
pub use app::{build_app, build_registry, AppMetrics, AppState, ProcessMemoryCollector};
pub use config::{AppConfig, AppConfigBuilder, DEFAULT_LISTEN_ADDR};
pub use error::{AppError, ErrorConfig, ErrorKind};
pub use health::{health_routes, ProbeResponse};
pub use observability::{ObservabilityConfig, ObservabilityConfigBuilder};
pub use parse::{parse_buckets, parse_duration};

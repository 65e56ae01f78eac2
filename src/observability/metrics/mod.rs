//! Application Metrics Infrastructure
//!
//! Provides a complete metrics solution for Axum applications:
//! - Define custom counters, histograms, and gauges
//! - Automatic HTTP request instrumentation
//! - Prometheus text format export
//! - `/metrics` endpoint for scraping
//!
//! # Quick Start
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use myapp::observability::metrics::{HttpMetrics, MetricRegistry, ObservableRouter};
//! use std::sync::Arc;
//!
//! // Define your metrics
//! let registry = Arc::new(MetricRegistry::builder()
//!     .namespace("myapp")
//!     .with_http_metrics()  // Standard HTTP metrics
//!     .counter("orders_processed_total", &["status"], "Total orders processed")
//!     .gauge("queue_size", &[], "Current queue size")
//!     .build()?);
//!
//! // Build your router with observability
//! let app = Router::new()
//!     .route("/", get(handler))
//!     .with_observability(HttpMetrics::new(registry.clone())?);
//! ```
//!
//! # Recording Custom Metrics
//!
//! ```ignore
//! let orders = registry.handle("myapp_orders_processed_total").unwrap();
//! registry.increment_counter(&orders, &["success"], 1.0)?;
//! ```
//!
//! # Standard HTTP Metrics
//!
//! When you call `with_http_metrics()`, the following are automatically tracked:
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `<ns>_http_requests_total` | Counter | method, endpoint, status | Completed requests |
//! | `<ns>_request_duration_seconds` | Histogram | method, endpoint | Request duration |
//! | `<ns>_errors_total` | Counter | error_type | Failed handler invocations |
//! | `<ns>_active_connections` | Gauge | - | Requests in flight |
//!
//! Failed requests only count toward `errors_total`. The endpoint label is
//! the raw request path.

mod middleware;
mod prometheus;
mod registry;
mod router;
mod types;

// Core types
pub use registry::{
    Collector, HttpMetrics, MetricDef, MetricHandle, MetricRegistry, MetricRegistryBuilder,
    MetricSnapshot, MetricsError,
};
pub use types::{HistogramData, LabelValues, MetricKind, SampleValue};

// Names and buckets
pub use registry::{ACTIVE_CONNECTIONS, ERRORS_TOTAL, HTTP_REQUESTS_TOTAL, REQUEST_DURATION_SECONDS};
pub use types::HTTP_DURATION_BUCKETS;

// Prometheus export
pub use prometheus::{export_prometheus, render, PrometheusExport, CONTENT_TYPE};

// Middleware and router
pub use middleware::{
    http_metrics_middleware, instrument, metrics_handler, HandlerFailure, Instrumentation,
    MetricsInterceptor, RequestInfo, RequestInterceptor, ACCESS_LOG_TARGET, PANIC_ERROR_TYPE,
};
pub use router::ObservableRouter;

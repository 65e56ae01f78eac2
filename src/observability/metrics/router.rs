//! ObservableRouter trait for Axum integration
//!
//! Extension trait that adds observability to any Axum router.

use super::middleware::{http_metrics_middleware, metrics_handler, Instrumentation};
use super::registry::HttpMetrics;
use axum::{middleware, routing::get, Router};

/// Extension trait for adding observability to an Axum Router.
///
/// `with_observability`:
/// 1. Adds a `/metrics` endpoint for Prometheus scraping
/// 2. Wraps every route, `/metrics` included, in the instrumentation middleware
///
/// # Example
///
/// ```ignore
/// use axum::{Router, routing::get};
/// use myapp::observability::metrics::{HttpMetrics, MetricRegistry, ObservableRouter};
/// use std::sync::Arc;
///
/// async fn handler() -> &'static str { "Hello" }
///
/// let registry = Arc::new(MetricRegistry::builder()
///     .namespace("myapp")
///     .with_http_metrics()
///     .counter("orders_processed_total", &["status"], "Total orders processed")
///     .build()?);
///
/// let app = Router::new()
///     .route("/", get(handler))
///     .with_observability(HttpMetrics::new(registry)?);
/// ```
pub trait ObservableRouter {
    /// Add observability to this router, serving metrics at `/metrics`.
    fn with_observability(self, metrics: HttpMetrics) -> Self;

    /// Same as `with_observability` with a custom metrics path.
    fn with_observability_at(self, metrics: HttpMetrics, metrics_path: &str) -> Self;

    /// Full control over the interceptor and the client-address policy.
    fn with_instrumentation(
        self,
        instrumentation: Instrumentation,
        metrics: HttpMetrics,
        metrics_path: &str,
    ) -> Self;
}

impl<S> ObservableRouter for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_observability(self, metrics: HttpMetrics) -> Self {
        self.with_observability_at(metrics, "/metrics")
    }

    fn with_observability_at(self, metrics: HttpMetrics, metrics_path: &str) -> Self {
        let instrumentation = Instrumentation::metrics(metrics.clone());
        self.with_instrumentation(instrumentation, metrics, metrics_path)
    }

    fn with_instrumentation(
        self,
        instrumentation: Instrumentation,
        metrics: HttpMetrics,
        metrics_path: &str,
    ) -> Self {
        let registry = metrics.registry().clone();

        self
            // Add metrics endpoint
            .route(metrics_path, get(move || metrics_handler(registry.clone())))
            // Add instrumentation middleware
            .layer(middleware::from_fn(move |req, next| {
                http_metrics_middleware(instrumentation.clone(), req, next)
            }))
    }
}

//! HTTP metrics middleware for Axum
//!
//! Automatic HTTP request instrumentation that records:
//! - `<ns>_http_requests_total{method, endpoint, status}` - Counter
//! - `<ns>_request_duration_seconds{method, endpoint}` - Histogram
//! - `<ns>_errors_total{error_type}` - Counter
//! - `<ns>_active_connections` - Gauge
//!
//! The pipeline is an explicit [`RequestInterceptor`] with four hooks. The
//! `always` hook runs from a drop guard, so it fires exactly once whether
//! the handler succeeds, fails, panics or is cancelled.

use super::prometheus::{export_prometheus, CONTENT_TYPE};
use super::registry::{HttpMetrics, MetricRegistry};
use axum::{
    extract::{ConnectInfo, Request},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Target of the access and failure log records.
pub const ACCESS_LOG_TARGET: &str = "myapp::access";

/// `error_type` recorded for a handler that panicked.
pub const PANIC_ERROR_TYPE: &str = "Panic";

/// Marks a response as the outcome of an unhandled handler error.
///
/// Error types attach this as a response extension when they convert into a
/// response. The middleware routes such responses through
/// [`RequestInterceptor::on_error`] and returns them unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    /// Stable discriminator used as the `error_type` label
    pub error_type: String,
    /// Error message
    pub error: String,
}

impl HandlerFailure {
    /// Create a failure marker.
    pub fn new(error_type: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            error: error.into(),
        }
    }

    fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "handler panicked".to_string());
        Self::new(PANIC_ERROR_TYPE, message)
    }
}

/// What the interceptor knows about an inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    /// HTTP method
    pub method: String,
    /// Raw request path
    pub endpoint: String,
    /// Client identifier, `"unknown"` when none is available
    pub client_ip: String,
}

impl RequestInfo {
    /// Describe `request`.
    ///
    /// The client identifier is the peer address from [`ConnectInfo`]. When
    /// `trust_forwarded_headers` is set, proxy headers take precedence.
    pub fn from_request(request: &Request, trust_forwarded_headers: bool) -> Self {
        let forwarded = if trust_forwarded_headers {
            forwarded_client_ip(request.headers())
        } else {
            None
        };

        let client_ip = forwarded
            .or_else(|| {
                request
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            method: request.method().to_string(),
            endpoint: request.uri().path().to_string(),
            client_ip,
        }
    }
}

/// Extract the client address reported by a reverse proxy.
fn forwarded_client_ip(headers: &HeaderMap) -> Option<String> {
    // X-Forwarded-For (may contain multiple IPs, take first)
    if let Some(first_ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return Some(first_ip.to_string());
    }

    // X-Real-IP (single IP from reverse proxy), then CF-Connecting-IP (Cloudflare)
    ["x-real-ip", "cf-connecting-ip"].iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string)
    })
}

/// Hooks run around every request.
pub trait RequestInterceptor: Send + Sync + 'static {
    /// Runs before the handler is invoked.
    fn before(&self, request: &RequestInfo);

    /// Runs when the handler produced a response.
    fn on_success(&self, request: &RequestInfo, status: StatusCode, elapsed: Duration);

    /// Runs when the handler failed or panicked.
    fn on_error(&self, request: &RequestInfo, failure: &HandlerFailure, elapsed: Duration);

    /// Runs exactly once on every exit path, after the other hooks.
    fn always(&self, request: &RequestInfo);
}

/// Calls [`RequestInterceptor::always`] when dropped.
struct AlwaysGuard<'a, I: RequestInterceptor + ?Sized> {
    interceptor: &'a I,
    request: &'a RequestInfo,
}

impl<I: RequestInterceptor + ?Sized> Drop for AlwaysGuard<'_, I> {
    fn drop(&mut self) {
        self.interceptor.always(self.request);
    }
}

/// Run `handler` inside the interceptor hooks.
///
/// The handler's response (or panic) is passed through unchanged. If the
/// returned future is dropped before completion only `before` and `always`
/// run.
pub async fn instrument<I, F>(interceptor: &I, request: &RequestInfo, handler: F) -> Response
where
    I: RequestInterceptor + ?Sized,
    F: Future<Output = Response>,
{
    interceptor.before(request);
    let _guard = AlwaysGuard {
        interceptor,
        request,
    };
    let start = Instant::now();

    match AssertUnwindSafe(handler).catch_unwind().await {
        Ok(response) => {
            let elapsed = start.elapsed();
            match response.extensions().get::<HandlerFailure>() {
                Some(failure) => interceptor.on_error(request, failure, elapsed),
                None => interceptor.on_success(request, response.status(), elapsed),
            }
            response
        }
        Err(panic) => {
            let failure = HandlerFailure::from_panic(panic.as_ref());
            interceptor.on_error(request, &failure, start.elapsed());
            std::panic::resume_unwind(panic)
        }
    }
}

/// Interceptor that updates the standard HTTP metrics and writes the access log.
#[derive(Debug, Clone)]
pub struct MetricsInterceptor {
    metrics: HttpMetrics,
}

impl MetricsInterceptor {
    /// Create an interceptor recording into `metrics`.
    pub fn new(metrics: HttpMetrics) -> Self {
        Self { metrics }
    }

    /// The metrics this interceptor records into.
    pub fn metrics(&self) -> &HttpMetrics {
        &self.metrics
    }
}

impl RequestInterceptor for MetricsInterceptor {
    fn before(&self, _request: &RequestInfo) {
        if let Err(e) = self.metrics.inc_active_connections() {
            warn!(error = %e, "Failed to increment active connections");
        }
    }

    fn on_success(&self, request: &RequestInfo, status: StatusCode, elapsed: Duration) {
        let duration = elapsed.as_secs_f64();
        if let Err(e) = self.metrics.record_request(
            &request.method,
            &request.endpoint,
            status.as_u16(),
            duration,
        ) {
            warn!(error = %e, "Failed to record request metrics");
        }

        info!(
            target: ACCESS_LOG_TARGET,
            method = %request.method,
            endpoint = %request.endpoint,
            status = status.as_u16(),
            duration,
            client_ip = %request.client_ip,
            "HTTP request completed"
        );
    }

    fn on_error(&self, request: &RequestInfo, failure: &HandlerFailure, _elapsed: Duration) {
        if let Err(e) = self.metrics.record_error(&failure.error_type) {
            warn!(error = %e, "Failed to record error metric");
        }

        error!(
            target: ACCESS_LOG_TARGET,
            method = %request.method,
            endpoint = %request.endpoint,
            error = %failure.error,
            error_type = %failure.error_type,
            "Request failed"
        );
    }

    fn always(&self, _request: &RequestInfo) {
        if let Err(e) = self.metrics.dec_active_connections() {
            warn!(error = %e, "Failed to decrement active connections");
        }
    }
}

/// Shared middleware state: the interceptor and the client-address policy.
#[derive(Clone)]
pub struct Instrumentation {
    interceptor: Arc<dyn RequestInterceptor>,
    trust_forwarded_headers: bool,
}

impl Instrumentation {
    /// Wrap any interceptor.
    pub fn new(interceptor: impl RequestInterceptor) -> Self {
        Self {
            interceptor: Arc::new(interceptor),
            trust_forwarded_headers: false,
        }
    }

    /// Instrumentation recording the standard HTTP metrics.
    pub fn metrics(metrics: HttpMetrics) -> Self {
        Self::new(MetricsInterceptor::new(metrics))
    }

    /// Prefer `X-Forwarded-For` and friends over the peer address.
    pub fn trust_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded_headers = trust;
        self
    }
}

impl std::fmt::Debug for Instrumentation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrumentation")
            .field("trust_forwarded_headers", &self.trust_forwarded_headers)
            .finish_non_exhaustive()
    }
}

/// Middleware that instruments every request.
///
/// # Example
///
/// ```ignore
/// use axum::{Router, middleware, routing::get};
/// use myapp::observability::metrics::{
///     http_metrics_middleware, HttpMetrics, Instrumentation, MetricRegistry,
/// };
/// use std::sync::Arc;
///
/// let registry = Arc::new(MetricRegistry::builder()
///     .namespace("myapp")
///     .with_http_metrics()
///     .build()?);
/// let instrumentation = Instrumentation::metrics(HttpMetrics::new(registry)?);
///
/// let app = Router::new()
///     .route("/", get(handler))
///     .layer(middleware::from_fn(move |req, next| {
///         http_metrics_middleware(instrumentation.clone(), req, next)
///     }));
/// ```
pub async fn http_metrics_middleware(
    instrumentation: Instrumentation,
    request: Request,
    next: Next,
) -> Response {
    let info = RequestInfo::from_request(&request, instrumentation.trust_forwarded_headers);
    instrument(&*instrumentation.interceptor, &info, next.run(request)).await
}

/// Handler for the metrics endpoint.
///
/// Runs the registry's collectors, then renders the Prometheus text format.
pub async fn metrics_handler(metrics: Arc<MetricRegistry>) -> impl IntoResponse {
    metrics.collect();
    let body = export_prometheus(&metrics);
    (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::capture::CapturedLogs;
    use axum::body::Body;
    use parking_lot::Mutex;
    use tracing::instrument::WithSubscriber;

    fn http_metrics() -> HttpMetrics {
        let registry = Arc::new(
            MetricRegistry::builder()
                .namespace("test")
                .with_http_metrics()
                .build()
                .unwrap(),
        );
        HttpMetrics::new(registry).unwrap()
    }

    fn request_info(method: &str, endpoint: &str) -> RequestInfo {
        RequestInfo {
            method: method.to_string(),
            endpoint: endpoint.to_string(),
            client_ip: "127.0.0.1".to_string(),
        }
    }

    fn failing_response(error_type: &str) -> Response {
        let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
        response
            .extensions_mut()
            .insert(HandlerFailure::new(error_type, "This is a test error"));
        response
    }

    async fn exploding_handler() -> Response {
        panic!("handler exploded")
    }

    #[derive(Default)]
    struct Recording(Mutex<Vec<String>>);

    impl Recording {
        fn events(&self) -> Vec<String> {
            self.0.lock().clone()
        }
    }

    impl RequestInterceptor for Recording {
        fn before(&self, request: &RequestInfo) {
            self.0.lock().push(format!("before {}", request.endpoint));
        }

        fn on_success(&self, _request: &RequestInfo, status: StatusCode, _elapsed: Duration) {
            self.0.lock().push(format!("success {}", status.as_u16()));
        }

        fn on_error(&self, _request: &RequestInfo, failure: &HandlerFailure, _elapsed: Duration) {
            self.0.lock().push(format!("error {}", failure.error_type));
        }

        fn always(&self, _request: &RequestInfo) {
            self.0.lock().push("always".to_string());
        }
    }

    #[tokio::test]
    async fn test_hook_order_on_success() {
        let recording = Recording::default();
        let info = request_info("GET", "/ok");

        let response = instrument(&recording, &info, async {
            StatusCode::ACCEPTED.into_response()
        })
        .await;

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(recording.events(), vec!["before /ok", "success 202", "always"]);
    }

    #[tokio::test]
    async fn test_hook_order_on_failure() {
        let recording = Recording::default();
        let info = request_info("GET", "/api/error");

        let response = instrument(&recording, &info, async { failing_response("ValueError") }).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.extensions().get::<HandlerFailure>(),
            Some(&HandlerFailure::new("ValueError", "This is a test error"))
        );
        assert_eq!(
            recording.events(),
            vec!["before /api/error", "error ValueError", "always"]
        );
    }

    #[tokio::test]
    async fn test_success_records_request_and_duration() {
        let interceptor = MetricsInterceptor::new(http_metrics());
        let info = request_info("POST", "/api/users");

        for _ in 0..5 {
            instrument(&interceptor, &info, async { StatusCode::CREATED.into_response() }).await;
        }

        let metrics = interceptor.metrics();
        let registry = metrics.registry();
        assert_eq!(
            registry.counter_value(metrics.requests_total(), &["POST", "/api/users", "201"]),
            Some(5.0)
        );
        // No other status or endpoint was touched
        assert_eq!(
            registry.counter_value(metrics.requests_total(), &["POST", "/api/users", "200"]),
            None
        );
        let hist = registry
            .histogram_value(metrics.request_duration(), &["POST", "/api/users"])
            .unwrap();
        assert_eq!(hist.count, 5);
        assert!(hist.sum >= 0.0);
        assert_eq!(metrics.active_connections(), 0.0);
    }

    #[tokio::test]
    async fn test_failure_counts_errors_only() {
        let interceptor = MetricsInterceptor::new(http_metrics());
        let info = request_info("GET", "/api/error");

        instrument(&interceptor, &info, async { failing_response("ValueError") }).await;

        let metrics = interceptor.metrics();
        let registry = metrics.registry();
        assert_eq!(
            registry.counter_value(metrics.errors_total(), &["ValueError"]),
            Some(1.0)
        );
        assert_eq!(
            registry.counter_value(metrics.requests_total(), &["GET", "/api/error", "500"]),
            None
        );
        assert!(registry
            .histogram_value(metrics.request_duration(), &["GET", "/api/error"])
            .is_none());
        assert_eq!(metrics.active_connections(), 0.0);
    }

    #[tokio::test]
    async fn test_panic_is_counted_and_resumed() {
        let interceptor = MetricsInterceptor::new(http_metrics());
        let info = request_info("GET", "/boom");

        let result = AssertUnwindSafe(instrument(&interceptor, &info, exploding_handler()))
            .catch_unwind()
            .await;

        let payload = result.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"handler exploded"));

        let metrics = interceptor.metrics();
        assert_eq!(
            metrics
                .registry()
                .counter_value(metrics.errors_total(), &[PANIC_ERROR_TYPE]),
            Some(1.0)
        );
        assert_eq!(metrics.active_connections(), 0.0);
    }

    #[tokio::test]
    async fn test_cancellation_releases_gauge() {
        let interceptor = MetricsInterceptor::new(http_metrics());
        let info = request_info("GET", "/slow");

        {
            let fut = instrument(&interceptor, &info, std::future::pending::<Response>());
            tokio::pin!(fut);
            let timed_out = tokio::time::timeout(Duration::from_millis(10), &mut fut).await;
            assert!(timed_out.is_err());
            assert_eq!(interceptor.metrics().active_connections(), 1.0);
        }

        let metrics = interceptor.metrics();
        assert_eq!(metrics.active_connections(), 0.0);
        assert!(metrics
            .registry()
            .histogram_value(metrics.request_duration(), &["GET", "/slow"])
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_gauge_bounded_by_concurrency() {
        const CONCURRENCY: usize = 8;
        let interceptor = MetricsInterceptor::new(http_metrics());
        let barrier = Arc::new(tokio::sync::Barrier::new(CONCURRENCY));
        let peak = Arc::new(Mutex::new(0.0f64));

        let tasks: Vec<_> = (0..CONCURRENCY)
            .map(|i| {
                let interceptor = interceptor.clone();
                let barrier = barrier.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    let info = request_info("GET", "/concurrent");
                    let observer = interceptor.metrics().clone();
                    instrument(&interceptor, &info, async move {
                        barrier.wait().await;
                        let current = observer.active_connections();
                        {
                            let mut peak = peak.lock();
                            *peak = peak.max(current);
                        }
                        if i % 2 == 0 {
                            StatusCode::OK.into_response()
                        } else {
                            failing_response("ValueError")
                        }
                    })
                    .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        let peak = *peak.lock();
        assert!(peak >= 1.0);
        assert!(peak <= CONCURRENCY as f64);

        let metrics = interceptor.metrics();
        assert_eq!(metrics.active_connections(), 0.0);
        assert_eq!(
            metrics
                .registry()
                .counter_value(metrics.requests_total(), &["GET", "/concurrent", "200"]),
            Some((CONCURRENCY / 2) as f64)
        );
        assert_eq!(
            metrics
                .registry()
                .counter_value(metrics.errors_total(), &["ValueError"]),
            Some((CONCURRENCY / 2) as f64)
        );
    }

    #[tokio::test]
    async fn test_access_and_failure_logs() {
        let logs = CapturedLogs::default();
        let interceptor = MetricsInterceptor::new(http_metrics());

        async {
            let ok = request_info("GET", "/api/users");
            instrument(&interceptor, &ok, async { StatusCode::OK.into_response() }).await;
            let failed = request_info("GET", "/api/error");
            instrument(&interceptor, &failed, async { failing_response("ValueError") }).await;
        }
        .with_subscriber(logs.subscriber())
        .await;

        let records = logs.records();
        let access: Vec<_> = records
            .iter()
            .filter(|r| r["message"] == "HTTP request completed")
            .collect();
        assert_eq!(access.len(), 1);
        assert_eq!(access[0]["logger"], ACCESS_LOG_TARGET);
        assert_eq!(access[0]["level"], "INFO");
        assert_eq!(access[0]["method"], "GET");
        assert_eq!(access[0]["endpoint"], "/api/users");
        assert_eq!(access[0]["status"], 200);
        assert!(access[0]["duration"].as_f64().unwrap() >= 0.0);
        assert_eq!(access[0]["client_ip"], "127.0.0.1");

        let errors: Vec<_> = records.iter().filter(|r| r["level"] == "ERROR").collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["message"], "Request failed");
        assert_eq!(errors[0]["error_type"], "ValueError");
        assert_eq!(errors[0]["error"], "This is a test error");
        assert_eq!(errors[0]["endpoint"], "/api/error");
        assert!(errors[0].get("status").is_none());
    }

    #[test]
    fn test_client_ip_from_peer_address() {
        let mut request = Request::builder()
            .uri("/api/users?page=2")
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 5], 41000))));

        let info = RequestInfo::from_request(&request, false);
        assert_eq!(info.method, "GET");
        assert_eq!(info.endpoint, "/api/users");
        assert_eq!(info.client_ip, "10.0.0.5");
    }

    #[test]
    fn test_client_ip_from_trusted_headers() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            RequestInfo::from_request(&request, true).client_ip,
            "203.0.113.7"
        );

        let request = Request::builder()
            .header("cf-connecting-ip", "198.51.100.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            RequestInfo::from_request(&request, true).client_ip,
            "198.51.100.2"
        );
    }

    #[test]
    fn test_client_ip_unknown() {
        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(RequestInfo::from_request(&request, true).client_ip, "unknown");
    }

    #[tokio::test]
    async fn test_metrics_handler_content_type() {
        let metrics = http_metrics();
        let response = metrics_handler(metrics.registry().clone())
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            CONTENT_TYPE
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("# TYPE test_active_connections gauge\n"));
        assert!(text.contains("test_active_connections 0\n"));
    }
}

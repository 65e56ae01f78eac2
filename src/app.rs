//! Application routes and wiring
//!
//! Business endpoints, their metrics, and the composition of the full
//! router: routes, then instrumentation and `/metrics`, then the request
//! timeout as the outermost layer so a timeout cancels the instrumented
//! request.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::health::health_routes;
use crate::observability::metrics::{
    Collector, HttpMetrics, Instrumentation, MetricHandle, MetricRegistry, MetricsError,
    ObservableRouter,
};

/// Orders processed, by outcome.
pub const ORDERS_PROCESSED_TOTAL: &str = "orders_processed_total";
/// Payment amount processed, by currency.
pub const PAYMENT_AMOUNT_TOTAL: &str = "payment_amount_total";
/// Inventory level, by product.
pub const INVENTORY_LEVEL: &str = "inventory_level";
/// Database connection pool size.
pub const DATABASE_POOL_SIZE: &str = "database_pool_size";
/// Processing queue size.
pub const QUEUE_SIZE: &str = "queue_size";
/// Resident memory of the process.
pub const MEMORY_USAGE_BYTES: &str = "memory_usage_bytes";

const STARTUP_POOL_SIZE: f64 = 10.0;
const STARTUP_QUEUE_SIZE: f64 = 0.0;

/// Build the registry holding the standard HTTP metrics and the business metrics.
pub fn build_registry(config: &AppConfig) -> std::result::Result<MetricRegistry, MetricsError> {
    MetricRegistry::builder()
        .namespace(config.app_name.clone())
        .with_http_metrics_buckets(&config.duration_buckets)
        .gauge(MEMORY_USAGE_BYTES, &[], "Current memory usage in bytes")
        .gauge(DATABASE_POOL_SIZE, &[], "Current database connection pool size")
        .gauge(QUEUE_SIZE, &[], "Current size of the processing queue")
        .counter(
            ORDERS_PROCESSED_TOTAL,
            &["status"],
            "Total number of orders processed",
        )
        .counter(
            PAYMENT_AMOUNT_TOTAL,
            &["currency"],
            "Total payment amount processed",
        )
        .gauge(INVENTORY_LEVEL, &["product_id"], "Current inventory level")
        .build()
}

/// Handles to the business metrics.
#[derive(Debug, Clone)]
pub struct AppMetrics {
    registry: Arc<MetricRegistry>,
    orders_processed: MetricHandle,
    payment_amount: MetricHandle,
    inventory_level: MetricHandle,
    database_pool_size: MetricHandle,
    queue_size: MetricHandle,
    memory_usage: MetricHandle,
}

impl AppMetrics {
    /// Resolve the business metrics from a registry made by [`build_registry`].
    pub fn new(registry: Arc<MetricRegistry>) -> std::result::Result<Self, MetricsError> {
        let resolve = |name: &str| {
            let full = registry.qualified_name(name);
            registry
                .handle(&full)
                .ok_or(MetricsError::NotRegistered { name: full })
        };

        Ok(Self {
            orders_processed: resolve(ORDERS_PROCESSED_TOTAL)?,
            payment_amount: resolve(PAYMENT_AMOUNT_TOTAL)?,
            inventory_level: resolve(INVENTORY_LEVEL)?,
            database_pool_size: resolve(DATABASE_POOL_SIZE)?,
            queue_size: resolve(QUEUE_SIZE)?,
            memory_usage: resolve(MEMORY_USAGE_BYTES)?,
            registry,
        })
    }

    /// Get the underlying registry.
    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Initial gauge values set at startup.
    pub fn set_startup_gauges(&self) -> std::result::Result<(), MetricsError> {
        self.registry
            .set_gauge(&self.database_pool_size, &[], STARTUP_POOL_SIZE)?;
        self.registry.set_gauge(&self.queue_size, &[], STARTUP_QUEUE_SIZE)
    }

    /// Count an order as processed.
    pub fn record_order(&self) -> std::result::Result<(), MetricsError> {
        self.registry
            .increment_counter(&self.orders_processed, &["success"], 1.0)
    }

    /// Add an order's payment to the per-currency total.
    pub fn record_payment(&self, currency: &str, amount: f64) -> std::result::Result<(), MetricsError> {
        self.registry
            .increment_counter(&self.payment_amount, &[currency], amount)
    }

    /// Record a failed order.
    pub fn record_failed_order(&self) -> std::result::Result<(), MetricsError> {
        self.registry
            .increment_counter(&self.orders_processed, &["failed"], 1.0)
    }

    /// Set the inventory level of a product.
    pub fn set_inventory_level(
        &self,
        product_id: &str,
        level: f64,
    ) -> std::result::Result<(), MetricsError> {
        self.registry
            .set_gauge(&self.inventory_level, &[product_id], level)
    }

    /// The memory usage gauge.
    pub fn memory_usage(&self) -> &MetricHandle {
        &self.memory_usage
    }
}

/// Sets the memory usage gauge from the resident set size before each scrape.
///
/// Platforms without `/proc/self/status` leave the gauge unchanged.
#[derive(Debug, Clone)]
pub struct ProcessMemoryCollector {
    memory_usage: MetricHandle,
}

impl ProcessMemoryCollector {
    /// Collector updating `memory_usage`.
    pub fn new(memory_usage: MetricHandle) -> Self {
        Self { memory_usage }
    }
}

impl Collector for ProcessMemoryCollector {
    fn collect(&self, registry: &MetricRegistry) {
        let Some(rss) = resident_set_size() else {
            return;
        };
        if let Err(e) = registry.set_gauge(&self.memory_usage, &[], rss) {
            warn!(error = %e, "Failed to update memory usage");
        }
    }
}

fn resident_set_size() -> Option<f64> {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| parse_vm_rss(&status))
}

/// Resident set size in bytes from the contents of `/proc/<pid>/status`.
fn parse_vm_rss(status: &str) -> Option<f64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some((kib * 1024) as f64)
}

/// Shared state of the application routes.
#[derive(Debug, Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    http: HttpMetrics,
    metrics: AppMetrics,
}

impl AppState {
    /// Build the registry and resolve all metrics.
    pub fn new(config: AppConfig) -> std::result::Result<Self, MetricsError> {
        let registry = Arc::new(build_registry(&config)?);
        let http = HttpMetrics::new(registry.clone())?;
        let metrics = AppMetrics::new(registry.clone())?;
        registry.add_collector(Arc::new(ProcessMemoryCollector::new(
            metrics.memory_usage().clone(),
        )));

        Ok(Self {
            config: Arc::new(config),
            http,
            metrics,
        })
    }

    /// Service configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Standard HTTP metrics.
    pub fn http_metrics(&self) -> &HttpMetrics {
        &self.http
    }

    /// Business metrics.
    pub fn metrics(&self) -> &AppMetrics {
        &self.metrics
    }

    /// The shared metric registry.
    pub fn registry(&self) -> &Arc<MetricRegistry> {
        self.http.registry()
    }

    /// Startup hook: logs and sets the initial gauge values.
    pub fn on_startup(&self) -> std::result::Result<(), MetricsError> {
        info!(
            version = %self.config.version,
            app = %self.config.app_name,
            "Application starting"
        );
        self.metrics.set_startup_gauges()
    }

    /// Shutdown hook.
    pub fn on_shutdown(&self) {
        info!(app = %self.config.app_name, "Application shutting down");
    }
}

/// Compose the full service router.
pub fn build_app(state: AppState) -> Router {
    let config = state.config.clone();
    let http = state.http.clone();
    let instrumentation = Instrumentation::metrics(http.clone())
        .trust_forwarded_headers(config.trust_forwarded_headers);

    Router::new()
        .route("/", get(root))
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/orders", post(process_order))
        .route("/api/error", get(trigger_error))
        .with_state(state)
        .merge(health_routes::<()>(&config.app_name))
        .with_instrumentation(instrumentation, http, &config.metrics_path)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
}

// ============================================================================
// Handlers
// ============================================================================

async fn root(State(state): State<AppState>) -> Json<Value> {
    info!("Root endpoint accessed");
    Json(json!({
        "message": "Hello World",
        "app": state.config.app_name,
        "version": state.config.version,
        "metrics": state.config.metrics_path,
    }))
}

#[derive(Debug, Clone, Serialize)]
struct User {
    id: u32,
    name: &'static str,
    email: &'static str,
}

async fn list_users() -> Json<Value> {
    // Simulated work
    let delay = Duration::from_millis(rand::thread_rng().gen_range(10..=100));
    tokio::time::sleep(delay).await;

    let users = vec![
        User {
            id: 1,
            name: "Alice",
            email: "alice@example.com",
        },
        User {
            id: 2,
            name: "Bob",
            email: "bob@example.com",
        },
    ];

    info!(user_count = users.len(), "Users endpoint accessed");
    Json(json!({ "users": users }))
}

async fn create_user(Json(user): Json<Map<String, Value>>) -> Json<Value> {
    info!(
        user_id = json_field(user.get("id")),
        user_name = json_field(user.get("name")),
        "User created"
    );
    Json(json!({ "status": "created", "user": user }))
}

async fn process_order(
    State(state): State<AppState>,
    Json(order): Json<Map<String, Value>>,
) -> Result<Json<Value>> {
    let order_id = order.get("order_id").cloned().unwrap_or_else(|| json!("unknown"));
    let amount = order.get("amount").cloned().unwrap_or_else(|| json!(0));
    let currency = field_text(order.get("currency"), "USD");

    match charge(&state.metrics, &amount, &currency) {
        Ok(()) => {
            info!(
                order_id = json_field(Some(&order_id)),
                amount = json_field(Some(&amount)),
                currency = %currency,
                "Order processed successfully"
            );
            Ok(Json(json!({
                "status": "success",
                "order_id": order_id,
                "message": "Order processed",
            })))
        }
        Err(err) => {
            if let Err(e) = state.metrics.record_failed_order() {
                warn!(error = %e, "Failed to record failed order");
            }
            error!(
                order_id = json_field(Some(&order_id)),
                error = %err.message,
                "Order processing failed"
            );
            Err(err)
        }
    }
}

/// Counts the order, then adds its payment. A bad amount fails after the
/// order is already counted.
fn charge(metrics: &AppMetrics, amount: &Value, currency: &str) -> Result<()> {
    metrics.record_order()?;
    let amount = match amount {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| AppError::value(format!("amount {n} is not representable")))?,
        other => return Err(AppError::type_error(format!("amount must be a number, got {other}"))),
    };
    metrics.record_payment(currency, amount)?;
    Ok(())
}

async fn trigger_error() -> Result<Json<Value>> {
    error!(endpoint = "/api/error", "Intentional error triggered");
    Err(AppError::value("This is a test error"))
}

/// A JSON request field as a log field that keeps its JSON type.
///
/// Null and absent values record nothing, which the JSON log format renders
/// as `null`.
fn json_field(value: Option<&Value>) -> Option<Box<dyn tracing::field::Value + '_>> {
    let field: Box<dyn tracing::field::Value + '_> = match value? {
        Value::Null => return None,
        Value::Bool(b) => Box::new(*b),
        Value::Number(n) => match (n.as_u64(), n.as_i64(), n.as_f64()) {
            (Some(u), _, _) => Box::new(u),
            (None, Some(i), _) => Box::new(i),
            (None, None, Some(f)) => Box::new(f),
            (None, None, None) => Box::new(tracing::field::display(n)),
        },
        Value::String(s) => Box::new(s.as_str()),
        other => Box::new(tracing::field::display(other)),
    };
    Some(field)
}

/// Text of an optional JSON field: strings verbatim, other values as JSON.
fn field_text(value: Option<&Value>, default: &str) -> String {
    match value {
        None => default.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::capture::CapturedLogs;
    use crate::observability::metrics::CONTENT_TYPE;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{header, Request};
    use axum::response::Response;
    use std::net::SocketAddr;
    use tower::ServiceExt;
    use tracing::instrument::WithSubscriber;

    fn test_state() -> AppState {
        AppState::new(AppConfig::default()).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    fn counter(state: &AppState, name: &str, labels: &[&str]) -> Option<f64> {
        let handle = state.registry().handle(name).unwrap();
        state.registry().counter_value(&handle, labels)
    }

    #[tokio::test]
    async fn test_root_endpoint() {
        let state = test_state();
        let app = build_app(state.clone());

        let response = app.oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({
                "message": "Hello World",
                "app": "myapp",
                "version": "1.0.0",
                "metrics": "/metrics",
            })
        );
        assert_eq!(
            counter(&state, "myapp_http_requests_total", &["GET", "/", "200"]),
            Some(1.0)
        );
    }

    #[tokio::test]
    async fn test_list_users() {
        let state = test_state();
        let app = build_app(state.clone());

        let response = app.oneshot(get_request("/api/users")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["users"].as_array().unwrap().len(), 2);
        assert_eq!(body["users"][0]["name"], "Alice");

        let http = state.http_metrics();
        let hist = state
            .registry()
            .histogram_value(http.request_duration(), &["GET", "/api/users"])
            .unwrap();
        assert_eq!(hist.count, 1);
        // At least 10ms of simulated work
        assert!(hist.sum >= 0.01);
        assert_eq!(hist.bucket(0.01), Some(0));
        assert_eq!(hist.bucket(5.0), Some(1));
    }

    #[tokio::test]
    async fn test_create_user_echoes_body() {
        let app = build_app(test_state());
        let user = json!({"id": 7, "name": "Carol"});

        let response = app
            .oneshot(post_json("/api/users", user.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"status": "created", "user": user})
        );
    }

    #[tokio::test]
    async fn test_create_user_logs_typed_fields() {
        let logs = CapturedLogs::default();
        let app = build_app(test_state());

        app.clone()
            .oneshot(post_json("/api/users", json!({"name": "Carol", "id": 7})))
            .with_subscriber(logs.subscriber())
            .await
            .unwrap();
        app.oneshot(post_json("/api/users", json!({"name": "Dave"})))
            .with_subscriber(logs.subscriber())
            .await
            .unwrap();

        let created: Vec<Value> = logs
            .records()
            .into_iter()
            .filter(|r| r["message"] == "User created")
            .collect();
        assert_eq!(created.len(), 2);
        assert_eq!(created[0]["user_id"], json!(7));
        assert_eq!(created[0]["user_name"], json!("Carol"));
        assert_eq!(created[1]["user_id"], Value::Null);
        assert!(created[1].as_object().unwrap().contains_key("user_id"));
    }

    #[tokio::test]
    async fn test_process_order() {
        let state = test_state();
        let app = build_app(state.clone());

        let response = app
            .oneshot(post_json(
                "/api/orders",
                json!({"order_id": "A-1", "amount": 12.5, "currency": "EUR"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"status": "success", "order_id": "A-1", "message": "Order processed"})
        );

        assert_eq!(
            counter(&state, "myapp_payment_amount_total", &["EUR"]),
            Some(12.5)
        );
        assert_eq!(
            counter(&state, "myapp_orders_processed_total", &["success"]),
            Some(1.0)
        );
    }

    #[tokio::test]
    async fn test_process_order_log_keeps_amount_type() {
        let logs = CapturedLogs::default();
        let app = build_app(test_state());

        app.oneshot(post_json(
            "/api/orders",
            json!({"order_id": "A-3", "amount": 20, "currency": "GBP"}),
        ))
        .with_subscriber(logs.subscriber())
        .await
        .unwrap();

        let records = logs.records();
        let processed = records
            .iter()
            .find(|r| r["message"] == "Order processed successfully")
            .unwrap();
        assert_eq!(processed["order_id"], "A-3");
        assert_eq!(processed["amount"], json!(20));
        assert_eq!(processed["currency"], "GBP");
    }

    #[tokio::test]
    async fn test_process_order_defaults() {
        let state = test_state();
        let app = build_app(state.clone());

        let response = app
            .oneshot(post_json("/api/orders", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["order_id"], "unknown");
        assert_eq!(
            counter(&state, "myapp_payment_amount_total", &["USD"]),
            Some(0.0)
        );
    }

    #[tokio::test]
    async fn test_negative_order_amount_fails() {
        let state = test_state();
        let app = build_app(state.clone());

        let response = app
            .oneshot(post_json(
                "/api/orders",
                json!({"order_id": "A-2", "amount": -5, "currency": "USD"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        // The order is counted before its payment is rejected
        assert_eq!(
            counter(&state, "myapp_orders_processed_total", &["success"]),
            Some(1.0)
        );
        assert_eq!(
            counter(&state, "myapp_orders_processed_total", &["failed"]),
            Some(1.0)
        );
        assert_eq!(
            counter(&state, "myapp_payment_amount_total", &["USD"]),
            None
        );
        assert_eq!(
            counter(&state, "myapp_errors_total", &["ValueError"]),
            Some(1.0)
        );
    }

    #[tokio::test]
    async fn test_non_numeric_order_amount_fails() {
        let logs = CapturedLogs::default();
        let state = test_state();
        let app = build_app(state.clone());

        let response = app
            .clone()
            .oneshot(post_json("/api/orders", json!({"order_id": 9, "amount": "lots"})))
            .with_subscriber(logs.subscriber())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = app
            .oneshot(post_json("/api/orders", json!({"amount": null})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(
            counter(&state, "myapp_orders_processed_total", &["success"]),
            Some(2.0)
        );
        assert_eq!(
            counter(&state, "myapp_orders_processed_total", &["failed"]),
            Some(2.0)
        );
        assert_eq!(
            counter(&state, "myapp_errors_total", &["TypeError"]),
            Some(2.0)
        );

        let records = logs.records();
        let failed = records
            .iter()
            .find(|r| r["message"] == "Order processing failed")
            .unwrap();
        assert_eq!(failed["level"], "ERROR");
        assert_eq!(failed["order_id"], json!(9));
    }

    #[tokio::test]
    async fn test_error_endpoint() {
        let logs = CapturedLogs::default();
        let state = test_state();
        let app = build_app(state.clone());

        let response = app
            .oneshot(get_request("/api/error"))
            .with_subscriber(logs.subscriber())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(
            counter(&state, "myapp_errors_total", &["ValueError"]),
            Some(1.0)
        );
        // Failures are not counted as completed requests
        assert_eq!(
            counter(&state, "myapp_http_requests_total", &["GET", "/api/error", "500"]),
            None
        );
        assert!(state
            .registry()
            .histogram_value(state.http_metrics().request_duration(), &["GET", "/api/error"])
            .is_none());
        assert_eq!(state.http_metrics().active_connections(), 0.0);

        let records = logs.records();
        let failures: Vec<_> = records
            .iter()
            .filter(|r| r["level"] == "ERROR" && r["error_type"] == "ValueError")
            .collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0]["message"], "Request failed");
        assert_eq!(failures[0]["error"], "This is a test error");
        assert!(records
            .iter()
            .any(|r| r["message"] == "Intentional error triggered" && r["level"] == "ERROR"));
    }

    #[tokio::test]
    async fn test_repeated_requests_counted_exactly() {
        let state = test_state();
        let app = build_app(state.clone());

        for _ in 0..5 {
            let response = app.clone().oneshot(get_request("/health")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        assert_eq!(
            counter(&state, "myapp_http_requests_total", &["GET", "/health", "200"]),
            Some(5.0)
        );
        let handle = state.http_metrics().requests_total();
        let series: usize = state
            .registry()
            .snapshot()
            .iter()
            .filter(|family| family.metric.name() == handle.name())
            .map(|family| family.series.len())
            .sum();
        assert_eq!(series, 1);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let state = test_state();
        state.on_startup().unwrap();
        let app = build_app(state);

        let response = app.oneshot(get_request("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            CONTENT_TYPE
        );

        let text = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(text.contains("# TYPE myapp_http_requests_total counter\n"));
        assert!(text.contains("# TYPE myapp_request_duration_seconds histogram\n"));
        assert!(text.contains("# HELP myapp_errors_total Total number of errors\n"));
        assert!(text.contains("myapp_database_pool_size 10\n"));
        assert!(text.contains("myapp_queue_size 0\n"));
        assert!(text.contains("myapp_active_connections 1\n"));
    }

    #[tokio::test]
    async fn test_timeout_releases_active_connection() {
        let config = AppConfig::builder()
            .request_timeout(Duration::from_millis(1))
            .build();
        let state = AppState::new(config).unwrap();
        let app = build_app(state.clone());

        // Simulated work takes at least 10ms
        let response = app.oneshot(get_request("/api/users")).await.unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

        assert_eq!(state.http_metrics().active_connections(), 0.0);
        assert_eq!(
            counter(&state, "myapp_http_requests_total", &["GET", "/api/users", "200"]),
            None
        );
    }

    #[tokio::test]
    async fn test_client_ip_from_connect_info() {
        let logs = CapturedLogs::default();
        let app = build_app(test_state());

        let mut request = get_request("/health");
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 10], 5555))));

        app.oneshot(request)
            .with_subscriber(logs.subscriber())
            .await
            .unwrap();

        let access = logs
            .records()
            .into_iter()
            .find(|r| r["message"] == "HTTP request completed")
            .unwrap();
        assert_eq!(access["client_ip"], "192.0.2.10");
        assert_eq!(access["endpoint"], "/health");
    }

    #[test]
    fn test_startup_gauges_and_inventory() {
        let state = test_state();
        state.on_startup().unwrap();

        let registry = state.registry();
        let pool = registry.handle("myapp_database_pool_size").unwrap();
        assert_eq!(registry.gauge_value(&pool, &[]), Some(10.0));

        state.metrics().set_inventory_level("sku-1", 42.0).unwrap();
        let inventory = registry.handle("myapp_inventory_level").unwrap();
        assert_eq!(registry.gauge_value(&inventory, &["sku-1"]), Some(42.0));
    }

    #[test]
    fn test_parse_vm_rss() {
        let status = "Name:\tmyapp\nVmPeak:\t  20000 kB\nVmRSS:\t   10240 kB\nThreads:\t4\n";
        assert_eq!(parse_vm_rss(status), Some(10240.0 * 1024.0));
        assert_eq!(parse_vm_rss("Name:\tmyapp\n"), None);
    }

    #[test]
    fn test_invalid_app_name_rejected() {
        let config = AppConfig::builder().app_name("my-app").build();
        assert!(matches!(
            AppState::new(config),
            Err(MetricsError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_field_text() {
        assert_eq!(field_text(None, "unknown"), "unknown");
        assert_eq!(field_text(Some(&json!("A-1")), "unknown"), "A-1");
        assert_eq!(field_text(Some(&json!(42)), "unknown"), "42");
    }
}

//! MetricRegistry - Application metrics registration and management
//!
//! Metrics are registered once at startup and live for the whole process.
//! Each metric keeps a table of series keyed by label values; series are
//! created lazily on first use and never removed.

use super::types::{
    AtomicF64, HistogramCell, HistogramData, LabelValues, MetricKind, SampleValue,
    HTTP_DURATION_BUCKETS,
};
use parking_lot::{RwLock, RwLockWriteGuard};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Name of the standard request counter (before namespacing).
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
/// Name of the standard request duration histogram (before namespacing).
pub const REQUEST_DURATION_SECONDS: &str = "request_duration_seconds";
/// Name of the standard handler error counter (before namespacing).
pub const ERRORS_TOTAL: &str = "errors_total";
/// Name of the standard in-flight request gauge (before namespacing).
pub const ACTIVE_CONNECTIONS: &str = "active_connections";

/// Registry misuse errors.
///
/// These indicate programming mistakes (bad registration, wrong arity) and
/// are surfaced at registration or observation time.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MetricsError {
    /// A metric with this name already exists
    #[error("metric `{name}` is already registered")]
    DuplicateMetric { name: String },

    /// Wrong number of label values for the metric
    #[error("metric `{name}` expects {expected} label values, got {actual}")]
    LabelCardinality {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Negative or NaN counter increment, or NaN observation
    #[error("metric `{name}` cannot take amount {amount}")]
    InvalidAmount { name: String, amount: f64 },

    /// Metric name does not match `[a-zA-Z_:][a-zA-Z0-9_:]*`
    #[error("invalid metric name `{name}`")]
    InvalidName { name: String },

    /// Label name is malformed or reserved
    #[error("metric `{name}` has invalid label name `{label}`")]
    InvalidLabelName { name: String, label: String },

    /// Histogram bucket boundaries are not finite and strictly ascending
    #[error("histogram `{name}` buckets must be finite and strictly ascending")]
    InvalidBuckets { name: String },

    /// Operation does not apply to this kind of metric
    #[error("metric `{name}` is a {actual}, not a {expected}")]
    KindMismatch {
        name: String,
        expected: MetricKind,
        actual: MetricKind,
    },

    /// Lookup of a metric that was never registered
    #[error("metric `{name}` is not registered")]
    NotRegistered { name: String },
}

/// Metric definition with metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDef {
    /// Metric name (e.g., `myapp_http_requests_total`)
    pub name: String,
    /// Help text describing the metric
    pub help: String,
    /// Metric kind
    pub kind: MetricKind,
    /// Label names for this metric, in order
    pub labels: Vec<String>,
    /// Finite bucket boundaries (histograms only)
    pub buckets: Vec<f64>,
}

impl MetricDef {
    /// Define a counter.
    pub fn counter(name: &str, labels: &[&str], help: &str) -> Self {
        Self::new(name, MetricKind::Counter, labels, Vec::new(), help)
    }

    /// Define a gauge.
    pub fn gauge(name: &str, labels: &[&str], help: &str) -> Self {
        Self::new(name, MetricKind::Gauge, labels, Vec::new(), help)
    }

    /// Define a histogram with the given bucket boundaries.
    pub fn histogram(name: &str, labels: &[&str], buckets: &[f64], help: &str) -> Self {
        Self::new(name, MetricKind::Histogram, labels, buckets.to_vec(), help)
    }

    fn new(name: &str, kind: MetricKind, labels: &[&str], buckets: Vec<f64>, help: &str) -> Self {
        Self {
            name: name.to_string(),
            help: help.to_string(),
            kind,
            labels: labels.iter().map(|s| s.to_string()).collect(),
            buckets,
        }
    }

    fn validate(&self) -> Result<(), MetricsError> {
        if !is_valid_metric_name(&self.name) {
            return Err(MetricsError::InvalidName {
                name: self.name.clone(),
            });
        }

        for (i, label) in self.labels.iter().enumerate() {
            let reserved = self.kind == MetricKind::Histogram && label == "le";
            let repeated = self.labels[..i].contains(label);
            if reserved || repeated || !is_valid_label_name(label) {
                return Err(MetricsError::InvalidLabelName {
                    name: self.name.clone(),
                    label: label.clone(),
                });
            }
        }

        if self.kind == MetricKind::Histogram {
            let finite = self.buckets.iter().all(|b| b.is_finite());
            let ascending = self.buckets.windows(2).all(|w| w[0] < w[1]);
            if !finite || !ascending {
                return Err(MetricsError::InvalidBuckets {
                    name: self.name.clone(),
                });
            }
        }

        Ok(())
    }
}

fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn is_valid_label_name(name: &str) -> bool {
    if name.starts_with("__") {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug)]
enum Cell {
    Counter(AtomicF64),
    Gauge(AtomicF64),
    Histogram(HistogramCell),
}

impl Cell {
    fn sample(&self, bounds: &[f64]) -> SampleValue {
        match self {
            Cell::Counter(v) => SampleValue::Counter(v.get()),
            Cell::Gauge(v) => SampleValue::Gauge(v.get()),
            Cell::Histogram(h) => SampleValue::Histogram(h.data(bounds)),
        }
    }
}

/// Series of one metric, in creation order, with a hash index.
#[derive(Debug, Default)]
struct SeriesTable {
    index: HashMap<LabelValues, usize>,
    entries: Vec<(LabelValues, Cell)>,
}

#[derive(Debug)]
struct Metric {
    def: MetricDef,
    series: RwLock<SeriesTable>,
}

impl Metric {
    fn new(def: MetricDef) -> Self {
        let metric = Self {
            def,
            series: RwLock::new(SeriesTable::default()),
        };

        // Unlabeled metrics have exactly one series; expose it from the start.
        if metric.def.labels.is_empty() {
            let mut table = metric.series.write();
            table.index.insert(LabelValues::default(), 0);
            table.entries.push((LabelValues::default(), metric.new_cell()));
        }

        metric
    }

    fn new_cell(&self) -> Cell {
        match self.def.kind {
            MetricKind::Counter => Cell::Counter(AtomicF64::default()),
            MetricKind::Gauge => Cell::Gauge(AtomicF64::default()),
            MetricKind::Histogram => Cell::Histogram(HistogramCell::new(self.def.buckets.len())),
        }
    }

    fn check_arity(&self, values: &[&str]) -> Result<(), MetricsError> {
        if values.len() != self.def.labels.len() {
            return Err(MetricsError::LabelCardinality {
                name: self.def.name.clone(),
                expected: self.def.labels.len(),
                actual: values.len(),
            });
        }
        Ok(())
    }

    fn check_kind(&self, expected: MetricKind) -> Result<(), MetricsError> {
        if self.def.kind != expected {
            return Err(MetricsError::KindMismatch {
                name: self.def.name.clone(),
                expected,
                actual: self.def.kind,
            });
        }
        Ok(())
    }

    /// Run `f` against the series for `values`, creating it on first use.
    fn with_series<R>(&self, values: &[&str], f: impl FnOnce(&Cell) -> R) -> Result<R, MetricsError> {
        self.check_arity(values)?;
        let key = LabelValues::new(values);

        // Fast path: series already exists
        {
            let table = self.series.read();
            if let Some(&i) = table.index.get(&key) {
                return Ok(f(&table.entries[i].1));
            }
        }

        // Slow path: re-check under the write lock so racing creators agree
        let mut table = self.series.write();
        let existing = table.index.get(&key).copied();
        let i = match existing {
            Some(i) => i,
            None => {
                let i = table.entries.len();
                let cell = self.new_cell();
                table.entries.push((key.clone(), cell));
                table.index.insert(key, i);
                i
            }
        };
        let table = RwLockWriteGuard::downgrade(table);
        Ok(f(&table.entries[i].1))
    }

    fn read_series<R>(&self, values: &[&str], f: impl FnOnce(&Cell) -> R) -> Option<R> {
        if values.len() != self.def.labels.len() {
            return None;
        }
        let table = self.series.read();
        table
            .index
            .get(&LabelValues::new(values))
            .map(|&i| f(&table.entries[i].1))
    }
}

/// Handle to one registered metric.
///
/// Cheap to clone; updates through a handle skip the name lookup.
#[derive(Clone, Debug)]
pub struct MetricHandle(Arc<Metric>);

impl MetricHandle {
    /// Full metric name.
    pub fn name(&self) -> &str {
        &self.0.def.name
    }

    /// Help text.
    pub fn help(&self) -> &str {
        &self.0.def.help
    }

    /// Metric kind.
    pub fn kind(&self) -> MetricKind {
        self.0.def.kind
    }

    /// Declared label names.
    pub fn label_names(&self) -> &[String] {
        &self.0.def.labels
    }

    /// Finite bucket boundaries (empty unless a histogram).
    pub fn buckets(&self) -> &[f64] {
        &self.0.def.buckets
    }
}

/// Hook run before each scrape to refresh derived metrics.
pub trait Collector: Send + Sync {
    /// Update metrics in `registry`.
    fn collect(&self, registry: &MetricRegistry);
}

/// Current state of one metric.
#[derive(Debug, Clone)]
pub struct MetricSnapshot {
    /// The metric
    pub metric: MetricHandle,
    /// Series in creation order
    pub series: Vec<(LabelValues, SampleValue)>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    metrics: Vec<MetricHandle>,
    by_name: HashMap<String, usize>,
}

/// Central registry for application metrics.
///
/// Applications define their metrics once at startup, then record values
/// throughout the application lifecycle. All updates are in-memory and
/// safe under concurrent callers.
///
/// # Example
///
/// ```
/// use myapp::observability::metrics::{MetricDef, MetricRegistry};
///
/// let registry = MetricRegistry::new();
/// let jobs = registry
///     .register(MetricDef::counter("jobs_total", &["status"], "Total jobs processed"))
///     .unwrap();
///
/// registry.increment_counter(&jobs, &["completed"], 1.0).unwrap();
/// assert_eq!(registry.counter_value(&jobs, &["completed"]), Some(1.0));
/// ```
#[derive(Default)]
pub struct MetricRegistry {
    namespace: Option<String>,
    inner: RwLock<RegistryInner>,
    collectors: RwLock<Vec<Arc<dyn Collector>>>,
}

impl fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("namespace", &self.namespace)
            .field("metrics", &self.inner.read().metrics.len())
            .field("collectors", &self.collectors.read().len())
            .finish()
    }
}

impl MetricRegistry {
    /// Create an empty registry without a namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new builder.
    pub fn builder() -> MetricRegistryBuilder {
        MetricRegistryBuilder::default()
    }

    /// Namespace prefixed onto builder-declared metric names.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Apply the namespace to a short metric name.
    pub fn qualified_name(&self, name: &str) -> String {
        qualify(self.namespace.as_deref(), name)
    }

    fn namespaced(&self, mut def: MetricDef) -> MetricDef {
        def.name = self.qualified_name(&def.name);
        def
    }

    /// Register a metric under its exact name.
    pub fn register(&self, def: MetricDef) -> Result<MetricHandle, MetricsError> {
        def.validate()?;

        let mut inner = self.inner.write();
        if inner.by_name.contains_key(&def.name) {
            return Err(MetricsError::DuplicateMetric { name: def.name });
        }

        let handle = MetricHandle(Arc::new(Metric::new(def)));
        let index = inner.metrics.len();
        inner.by_name.insert(handle.name().to_string(), index);
        inner.metrics.push(handle.clone());
        Ok(handle)
    }

    /// Look up a metric by full name.
    pub fn handle(&self, name: &str) -> Option<MetricHandle> {
        let inner = self.inner.read();
        inner.by_name.get(name).map(|&i| inner.metrics[i].clone())
    }

    /// Number of registered metrics.
    pub fn len(&self) -> usize {
        self.inner.read().metrics.len()
    }

    /// Whether no metrics are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add `amount` (>= 0) to a counter series.
    pub fn increment_counter(
        &self,
        handle: &MetricHandle,
        labels: &[&str],
        amount: f64,
    ) -> Result<(), MetricsError> {
        let metric = &handle.0;
        metric.check_kind(MetricKind::Counter)?;
        if !(amount >= 0.0) {
            return Err(MetricsError::InvalidAmount {
                name: metric.def.name.clone(),
                amount,
            });
        }
        metric.with_series(labels, |cell| {
            if let Cell::Counter(v) = cell {
                v.add(amount);
            }
        })
    }

    /// Record one observation into a histogram series.
    pub fn observe_histogram(
        &self,
        handle: &MetricHandle,
        labels: &[&str],
        value: f64,
    ) -> Result<(), MetricsError> {
        let metric = &handle.0;
        metric.check_kind(MetricKind::Histogram)?;
        if value.is_nan() {
            return Err(MetricsError::InvalidAmount {
                name: metric.def.name.clone(),
                amount: value,
            });
        }
        metric.with_series(labels, |cell| {
            if let Cell::Histogram(h) = cell {
                h.observe(&metric.def.buckets, value);
            }
        })
    }

    /// Set a gauge series to `value`.
    pub fn set_gauge(
        &self,
        handle: &MetricHandle,
        labels: &[&str],
        value: f64,
    ) -> Result<(), MetricsError> {
        self.update_gauge(handle, labels, |v| v.set(value))
    }

    /// Add `delta` to a gauge series.
    pub fn inc_gauge(
        &self,
        handle: &MetricHandle,
        labels: &[&str],
        delta: f64,
    ) -> Result<(), MetricsError> {
        self.update_gauge(handle, labels, |v| {
            v.add(delta);
        })
    }

    /// Subtract `delta` from a gauge series.
    pub fn dec_gauge(
        &self,
        handle: &MetricHandle,
        labels: &[&str],
        delta: f64,
    ) -> Result<(), MetricsError> {
        self.update_gauge(handle, labels, |v| {
            v.add(-delta);
        })
    }

    fn update_gauge(
        &self,
        handle: &MetricHandle,
        labels: &[&str],
        f: impl FnOnce(&AtomicF64),
    ) -> Result<(), MetricsError> {
        let metric = &handle.0;
        metric.check_kind(MetricKind::Gauge)?;
        metric.with_series(labels, |cell| {
            if let Cell::Gauge(v) = cell {
                f(v);
            }
        })
    }

    /// Current value of a counter series, if it exists.
    pub fn counter_value(&self, handle: &MetricHandle, labels: &[&str]) -> Option<f64> {
        handle.0.read_series(labels, |cell| match cell {
            Cell::Counter(v) => Some(v.get()),
            _ => None,
        })?
    }

    /// Current value of a gauge series, if it exists.
    pub fn gauge_value(&self, handle: &MetricHandle, labels: &[&str]) -> Option<f64> {
        handle.0.read_series(labels, |cell| match cell {
            Cell::Gauge(v) => Some(v.get()),
            _ => None,
        })?
    }

    /// Current state of a histogram series, if it exists.
    pub fn histogram_value(&self, handle: &MetricHandle, labels: &[&str]) -> Option<HistogramData> {
        let bounds = &handle.0.def.buckets;
        handle.0.read_series(labels, |cell| match cell {
            Cell::Histogram(h) => Some(h.data(bounds)),
            _ => None,
        })?
    }

    /// Read every metric in registration order.
    ///
    /// Each series is read atomically; there is no atomicity across series
    /// or metrics.
    pub fn snapshot(&self) -> Vec<MetricSnapshot> {
        let metrics = self.inner.read().metrics.clone();
        metrics
            .into_iter()
            .map(|handle| {
                let series = {
                    let table = handle.0.series.read();
                    table
                        .entries
                        .iter()
                        .map(|(labels, cell)| (labels.clone(), cell.sample(&handle.0.def.buckets)))
                        .collect()
                };
                MetricSnapshot {
                    metric: handle,
                    series,
                }
            })
            .collect()
    }

    /// Add a collector run by [`MetricRegistry::collect`].
    pub fn add_collector(&self, collector: Arc<dyn Collector>) {
        self.collectors.write().push(collector);
    }

    /// Run all collectors.
    pub fn collect(&self) {
        let collectors = self.collectors.read().clone();
        for collector in collectors {
            collector.collect(self);
        }
    }
}

fn qualify(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}_{name}"),
        _ => name.to_string(),
    }
}

/// Builder for MetricRegistry.
#[derive(Default)]
pub struct MetricRegistryBuilder {
    namespace: Option<String>,
    defs: Vec<MetricDef>,
    http_buckets: Option<Vec<f64>>,
}

impl MetricRegistryBuilder {
    /// Set the namespace prefixed onto every metric declared here.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Add a counter metric.
    ///
    /// # Arguments
    ///
    /// * `name` - Metric name (e.g., `requests_total`)
    /// * `labels` - Label names (e.g., `["method", "status"]`)
    /// * `help` - Description of the metric
    pub fn counter(mut self, name: &str, labels: &[&str], help: &str) -> Self {
        self.defs.push(MetricDef::counter(name, labels, help));
        self
    }

    /// Add a histogram metric.
    ///
    /// # Arguments
    ///
    /// * `name` - Metric name (e.g., `request_duration_seconds`)
    /// * `labels` - Label names (e.g., `["method"]`)
    /// * `buckets` - Histogram bucket boundaries
    /// * `help` - Description of the metric
    pub fn histogram(mut self, name: &str, labels: &[&str], buckets: &[f64], help: &str) -> Self {
        self.defs.push(MetricDef::histogram(name, labels, buckets, help));
        self
    }

    /// Add a gauge metric.
    pub fn gauge(mut self, name: &str, labels: &[&str], help: &str) -> Self {
        self.defs.push(MetricDef::gauge(name, labels, help));
        self
    }

    /// Include standard HTTP metrics with the default duration buckets.
    ///
    /// Adds (namespaced):
    /// - `http_requests_total{method, endpoint, status}` - Counter
    /// - `errors_total{error_type}` - Counter
    /// - `request_duration_seconds{method, endpoint}` - Histogram
    /// - `active_connections` - Gauge
    pub fn with_http_metrics(self) -> Self {
        self.with_http_metrics_buckets(HTTP_DURATION_BUCKETS)
    }

    /// Include standard HTTP metrics with custom duration buckets.
    pub fn with_http_metrics_buckets(mut self, buckets: &[f64]) -> Self {
        self.http_buckets = Some(buckets.to_vec());
        self
    }

    /// Build the MetricRegistry.
    ///
    /// Standard HTTP metrics come first, then declared metrics in order.
    pub fn build(self) -> Result<MetricRegistry, MetricsError> {
        let registry = MetricRegistry {
            namespace: self.namespace,
            ..MetricRegistry::default()
        };

        if let Some(buckets) = self.http_buckets {
            let standard = [
                MetricDef::counter(
                    HTTP_REQUESTS_TOTAL,
                    &["method", "endpoint", "status"],
                    "Total HTTP requests received",
                ),
                MetricDef::counter(ERRORS_TOTAL, &["error_type"], "Total number of errors"),
                MetricDef::histogram(
                    REQUEST_DURATION_SECONDS,
                    &["method", "endpoint"],
                    &buckets,
                    "HTTP request duration in seconds",
                ),
                MetricDef::gauge(
                    ACTIVE_CONNECTIONS,
                    &[],
                    "Number of currently active connections",
                ),
            ];
            for def in standard {
                registry.register(registry.namespaced(def))?;
            }
        }

        for def in self.defs {
            registry.register(registry.namespaced(def))?;
        }

        Ok(registry)
    }
}

/// Handles to the standard HTTP metrics, shared by the middleware.
///
/// This is a thin wrapper around `Arc<MetricRegistry>` with the four
/// standard metrics resolved once up front.
#[derive(Clone, Debug)]
pub struct HttpMetrics {
    registry: Arc<MetricRegistry>,
    requests_total: MetricHandle,
    errors_total: MetricHandle,
    request_duration: MetricHandle,
    active_connections: MetricHandle,
}

impl HttpMetrics {
    /// Resolve the standard HTTP metrics from `registry`.
    ///
    /// The registry must have been built with `with_http_metrics()`.
    pub fn new(registry: Arc<MetricRegistry>) -> Result<Self, MetricsError> {
        let resolve = |name: &str, kind: MetricKind, arity: usize| -> Result<MetricHandle, MetricsError> {
            let full = registry.qualified_name(name);
            let handle = registry
                .handle(&full)
                .ok_or_else(|| MetricsError::NotRegistered { name: full.clone() })?;
            if handle.kind() != kind {
                return Err(MetricsError::KindMismatch {
                    name: full,
                    expected: kind,
                    actual: handle.kind(),
                });
            }
            if handle.label_names().len() != arity {
                return Err(MetricsError::LabelCardinality {
                    name: full,
                    expected: arity,
                    actual: handle.label_names().len(),
                });
            }
            Ok(handle)
        };

        Ok(Self {
            requests_total: resolve(HTTP_REQUESTS_TOTAL, MetricKind::Counter, 3)?,
            errors_total: resolve(ERRORS_TOTAL, MetricKind::Counter, 1)?,
            request_duration: resolve(REQUEST_DURATION_SECONDS, MetricKind::Histogram, 2)?,
            active_connections: resolve(ACTIVE_CONNECTIONS, MetricKind::Gauge, 0)?,
            registry,
        })
    }

    /// Get the underlying registry.
    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Record a completed HTTP request.
    ///
    /// Updates the request counter and the duration histogram.
    pub fn record_request(
        &self,
        method: &str,
        endpoint: &str,
        status: u16,
        duration_secs: f64,
    ) -> Result<(), MetricsError> {
        let status = status.to_string();
        self.registry
            .increment_counter(&self.requests_total, &[method, endpoint, &status], 1.0)?;
        self.registry
            .observe_histogram(&self.request_duration, &[method, endpoint], duration_secs)
    }

    /// Record a failed handler invocation.
    pub fn record_error(&self, error_type: &str) -> Result<(), MetricsError> {
        self.registry
            .increment_counter(&self.errors_total, &[error_type], 1.0)
    }

    /// Increment active connections.
    pub fn inc_active_connections(&self) -> Result<(), MetricsError> {
        self.registry.inc_gauge(&self.active_connections, &[], 1.0)
    }

    /// Decrement active connections.
    pub fn dec_active_connections(&self) -> Result<(), MetricsError> {
        self.registry.dec_gauge(&self.active_connections, &[], 1.0)
    }

    /// Current number of active connections.
    pub fn active_connections(&self) -> f64 {
        self.registry
            .gauge_value(&self.active_connections, &[])
            .unwrap_or(0.0)
    }

    /// Handle of the request counter.
    pub fn requests_total(&self) -> &MetricHandle {
        &self.requests_total
    }

    /// Handle of the error counter.
    pub fn errors_total(&self) -> &MetricHandle {
        &self.errors_total
    }

    /// Handle of the duration histogram.
    pub fn request_duration(&self) -> &MetricHandle {
        &self.request_duration
    }
}

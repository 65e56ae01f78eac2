//! Service configuration
//!
//! Provides a builder-pattern configuration for the HTTP service.

use std::net::SocketAddr;
use std::time::Duration;

use crate::observability::metrics::HTTP_DURATION_BUCKETS;
use crate::parse::{parse_bool, parse_buckets, parse_duration};

/// Default listen address.
pub const DEFAULT_LISTEN_ADDR: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), 8000);

/// Configuration for the HTTP service.
///
/// # Example
///
/// ```ignore
/// use myapp::AppConfig;
///
/// // Load from environment variables
/// let config = AppConfig::from_env();
///
/// // Or build programmatically
/// let config = AppConfig::builder()
///     .app_name("myapp")
///     .request_timeout(Duration::from_secs(10))
///     .build();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Application name, also the metric namespace
    pub app_name: String,

    /// Version reported by the root endpoint and startup log
    pub version: String,

    /// Address the server binds to
    pub listen_addr: SocketAddr,

    /// Path of the Prometheus scrape endpoint
    pub metrics_path: String,

    /// Requests running longer than this are cancelled with 408
    pub request_timeout: Duration,

    /// Bucket boundaries of the request duration histogram
    pub duration_buckets: Vec<f64>,

    /// Take the client address from proxy headers
    /// Only enable behind a reverse proxy that sets them
    pub trust_forwarded_headers: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "myapp".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            listen_addr: DEFAULT_LISTEN_ADDR,
            metrics_path: "/metrics".to_string(),
            request_timeout: Duration::from_secs(30),
            duration_buckets: HTTP_DURATION_BUCKETS.to_vec(),
            trust_forwarded_headers: false,
        }
    }
}

impl AppConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `APP_NAME`: application name and metric prefix (default: "myapp")
    /// - `LISTEN_ADDR`: e.g., "127.0.0.1:3000" (default: "0.0.0.0:8000")
    /// - `METRICS_PATH`: scrape endpoint path (default: "/metrics")
    /// - `REQUEST_TIMEOUT`: e.g., "30s", "5m" (default: "30s")
    /// - `HTTP_DURATION_BUCKETS`: comma-separated seconds (default: "0.01,0.05,0.1,0.5,1,2,5")
    /// - `TRUST_FORWARDED_HEADERS`: "true"/"false" (default: "false")
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let app_name = lookup("APP_NAME")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.app_name);

        let listen_addr = lookup("LISTEN_ADDR")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.listen_addr);

        let metrics_path = lookup("METRICS_PATH")
            .map(|s| s.trim().to_string())
            .filter(|s| s.starts_with('/'))
            .unwrap_or(defaults.metrics_path);

        let request_timeout = lookup("REQUEST_TIMEOUT")
            .map(|s| parse_duration(&s))
            .unwrap_or(defaults.request_timeout);

        let duration_buckets = lookup("HTTP_DURATION_BUCKETS")
            .and_then(|s| parse_buckets(&s))
            .unwrap_or(defaults.duration_buckets);

        let trust_forwarded_headers = lookup("TRUST_FORWARDED_HEADERS")
            .and_then(|s| parse_bool(&s))
            .unwrap_or(defaults.trust_forwarded_headers);

        Self {
            app_name,
            version: defaults.version,
            listen_addr,
            metrics_path,
            request_timeout,
            duration_buckets,
            trust_forwarded_headers,
        }
    }

    /// Create a new builder for programmatic configuration.
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }
}

/// Builder for AppConfig
#[derive(Debug, Clone, Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    /// Set the application name (metric namespace).
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.config.app_name = name.into();
        self
    }

    /// Set the reported version.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.config.version = version.into();
        self
    }

    /// Set the listen address.
    pub fn listen_addr(mut self, addr: SocketAddr) -> Self {
        self.config.listen_addr = addr;
        self
    }

    /// Set the metrics endpoint path.
    pub fn metrics_path(mut self, path: impl Into<String>) -> Self {
        self.config.metrics_path = path.into();
        self
    }

    /// Set request timeout duration.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the request duration histogram buckets.
    pub fn duration_buckets(mut self, buckets: &[f64]) -> Self {
        self.config.duration_buckets = buckets.to_vec();
        self
    }

    /// Trust `X-Forwarded-For` and similar headers for the client address.
    pub fn trust_forwarded_headers(mut self, trust: bool) -> Self {
        self.config.trust_forwarded_headers = trust;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> AppConfig {
        self.config
    }
}

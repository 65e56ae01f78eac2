//! Handler Error Handling
//!
//! Error type returned by request handlers, and how it turns into a
//! response.
//!
//! Client errors (4xx) are ordinary responses. Server errors (5xx) are
//! unhandled handler failures: besides the JSON body, the response carries
//! a [`HandlerFailure`] extension so the instrumentation middleware counts
//! them in `errors_total` and writes the failure log.
//!
//! # Usage
//!
//! ```ignore
//! use myapp::error::{AppError, ErrorConfig};
//!
//! async fn handler() -> Result<String, AppError> {
//!     Err(AppError::value("This is a test error"))
//! }
//!
//! // In production: {"error": "value_error", "message": "Internal server error"}
//! // In development: the real message and details are returned
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt;

use crate::observability::metrics::{HandlerFailure, MetricsError};

// ============================================================================
// Error Configuration
// ============================================================================

/// Error response configuration
#[derive(Debug, Clone)]
pub struct ErrorConfig {
    /// Whether to expose messages and details of server errors
    /// Should be `false` in production
    pub expose_details: bool,

    /// Message shown for server errors when details are hidden
    pub internal_error_message: String,
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl ErrorConfig {
    /// Production configuration (hides server error details)
    pub fn production() -> Self {
        Self {
            expose_details: false,
            internal_error_message: "Internal server error".to_string(),
        }
    }

    /// Development configuration (detailed errors)
    pub fn development() -> Self {
        Self {
            expose_details: true,
            internal_error_message: "Internal server error".to_string(),
        }
    }

    /// Load from environment
    ///
    /// Uses `RUST_ENV` or `APP_ENV` to determine mode:
    /// - "production" or "prod" -> production config
    /// - anything else -> development config
    pub fn from_env() -> Self {
        let env = std::env::var("RUST_ENV")
            .or_else(|_| std::env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        Self::for_environment(&env)
    }

    fn for_environment(env: &str) -> Self {
        match env.to_lowercase().as_str() {
            "production" | "prod" => Self::production(),
            _ => Self::development(),
        }
    }
}

// Global configuration (set once at startup)
static ERROR_CONFIG: std::sync::OnceLock<ErrorConfig> = std::sync::OnceLock::new();

/// Initialize error handling configuration
///
/// Call this once at application startup:
/// ```ignore
/// myapp::error::init(ErrorConfig::from_env());
/// ```
pub fn init(config: ErrorConfig) {
    let _ = ERROR_CONFIG.set(config);
}

/// Get the current error configuration
pub fn config() -> &'static ErrorConfig {
    ERROR_CONFIG.get_or_init(ErrorConfig::default)
}

// ============================================================================
// Error Types
// ============================================================================

/// Error returned by request handlers
#[derive(Debug)]
pub struct AppError {
    /// Error kind determines HTTP status and the `error_type` label
    pub kind: ErrorKind,
    /// Error message
    pub message: String,
    /// Extra context (hidden for server errors in production)
    pub details: Option<String>,
}

/// Error categories with appropriate HTTP status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad request (400)
    BadRequest,
    /// Not found (404)
    NotFound,
    /// Unprocessable entity (422) - validation error
    Validation,
    /// Invalid value reached business logic (500)
    Value,
    /// Value of the wrong type reached business logic (500)
    Type,
    /// Internal server error (500)
    Internal,
    /// Service unavailable (503) - temporary failure
    Unavailable,
}

impl ErrorKind {
    /// Get the HTTP status code for this error kind
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Value | Self::Type | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Value of the `error_type` label for this kind
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::BadRequest => "BadRequest",
            Self::NotFound => "NotFound",
            Self::Validation => "ValidationError",
            Self::Value => "ValueError",
            Self::Type => "TypeError",
            Self::Internal => "InternalError",
            Self::Unavailable => "ServiceUnavailable",
        }
    }

    /// Whether this kind is a handler failure rather than a handled response
    pub fn is_failure(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl AppError {
    /// Create a new error
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Create a value error (500)
    pub fn value(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Value, message)
    }

    /// Create a type error (500)
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, message)
    }

    /// Create an internal error (500)
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Add details
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// The failure marker attached to server error responses.
    pub fn failure(&self) -> Option<HandlerFailure> {
        self.kind
            .is_failure()
            .then(|| HandlerFailure::new(self.kind.error_type(), self.message.clone()))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest => write!(f, "bad_request"),
            Self::NotFound => write!(f, "not_found"),
            Self::Validation => write!(f, "validation_error"),
            Self::Value => write!(f, "value_error"),
            Self::Type => write!(f, "type_error"),
            Self::Internal => write!(f, "internal_error"),
            Self::Unavailable => write!(f, "service_unavailable"),
        }
    }
}

impl std::error::Error for AppError {}

// ============================================================================
// Error Response
// ============================================================================

/// JSON error response format
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorResponse {
    /// Error type/code
    pub error: String,
    /// Human-readable message
    pub message: String,
    /// Error details (only when exposed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AppError {
    fn to_error_response(&self, cfg: &ErrorConfig) -> ErrorResponse {
        let expose = cfg.expose_details || !self.kind.is_failure();
        ErrorResponse {
            error: self.kind.to_string(),
            message: if expose {
                self.message.clone()
            } else {
                cfg.internal_error_message.clone()
            },
            details: if expose { self.details.clone() } else { None },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Failures are logged by the instrumentation middleware
        if !self.kind.is_failure() {
            tracing::debug!(
                error_kind = %self.kind,
                message = %self.message,
                "Client error"
            );
        }

        let status = self.kind.status_code();
        let failure = self.failure();
        let body = self.to_error_response(config());

        let mut response = (status, Json(body)).into_response();
        if let Some(failure) = failure {
            response.extensions_mut().insert(failure);
        }
        response
    }
}

// ============================================================================
// Conversions from common error types
// ============================================================================

impl From<MetricsError> for AppError {
    fn from(err: MetricsError) -> Self {
        match err {
            MetricsError::InvalidAmount { .. } => AppError::value(err.to_string()),
            other => AppError::internal("Metrics error").with_details(other.to_string()),
        }
    }
}

// ============================================================================
// Result type alias
// ============================================================================

/// Result type alias for handlers returning AppError
pub type Result<T> = std::result::Result<T, AppError>;

// ============================================================================
// Tests
// ============================================================================

//! Liveness and readiness endpoints
//!
//! Static probes for orchestrators: `/health` answers as long as the process
//! serves requests, `/ready` once startup has finished.

use axum::{routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

/// Probe response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResponse {
    /// "healthy" or "ready"
    pub status: &'static str,
    /// Application name
    pub app: String,
}

/// Routes for `GET /health` and `GET /ready`.
pub fn health_routes<S>(app_name: &str) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let app: Arc<str> = Arc::from(app_name);
    let ready_app = app.clone();

    Router::new()
        .route(
            "/health",
            get(move || {
                let app = app.clone();
                async move { Json(probe("healthy", &app)) }
            }),
        )
        .route(
            "/ready",
            get(move || {
                let app = ready_app.clone();
                async move { Json(probe("ready", &app)) }
            }),
        )
}

fn probe(status: &'static str, app: &str) -> ProbeResponse {
    ProbeResponse {
        status,
        app: app.to_string(),
    }
}

//! Health check endpoint.

use axum::{
    Json, Router,
    http::{HeaderName, HeaderValue},
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Header carrying the gateway version on every health answer.
pub const VERSION_HEADER: &str = "x-auth-proxy-version";

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
}

/// Liveness probe (no auth required).
pub async fn health() -> impl IntoResponse {
    let version = env!("CARGO_PKG_VERSION");
    (
        [(
            HeaderName::from_static(VERSION_HEADER),
            HeaderValue::from_static(version),
        )],
        Json(HealthResponse {
            status: "ok".to_string(),
            version: version.to_string(),
        }),
    )
}

/// Create health check routes.
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/oauth/health", get(health))
}

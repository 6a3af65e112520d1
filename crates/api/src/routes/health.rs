use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok` or `degraded`.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the layout store is reachable.
    pub store_healthy: bool,
}

/// GET /health -- returns service and layout store health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_healthy = match state.store.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Layout store health check failed");
            false
        }
    };

    Json(HealthResponse {
        status: if store_healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        store_healthy,
    })
}

/// Mount health check routes (root level, not under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

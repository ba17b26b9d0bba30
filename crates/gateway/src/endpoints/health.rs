//! # GET /healthz
//!
//! Liveness probe. Touches neither storage nor configuration.

use axum::Json;
use uproxy_types::HealthStatus;

/// GET /healthz — always `{"status":"ok"}`.
pub async fn handle_healthz() -> Json<HealthStatus> {
    Json(HealthStatus::ok())
}

//! Liveness check.

use axum::Json;
use serde_json::{Value, json};

/// Service name reported by the health check.
pub const SERVICE_NAME: &str = "autohaul-api";

/// Liveness health check endpoint.
///
/// Returns `{"status":"ok"}` if the server is running. Does not check the
/// managed backend.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": SERVICE_NAME }))
}

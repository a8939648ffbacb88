//! Health Check API Handler

use axum::Json;
use serde_json::{Value, json};

/// GET /health
///
/// Liveness payload in the same shape deployed services are probed for.
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

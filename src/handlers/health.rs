use axum::{response::IntoResponse, Json};
use serde_json::json;

/// Basic liveness probe - just checks if the service is running
pub async fn liveness_check() -> impl IntoResponse {
    Json(json!({
        "status": "up",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

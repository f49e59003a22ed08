use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::services::get_metrics;
use crate::startup::AppState;

pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "tool-gateway",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Ready once the tool catalog is loaded.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let tools = state.registry.tool_count();
    let status = if tools > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if tools > 0 { "ready" } else { "not_ready" },
            "tools": tools,
            "cached_accounts": state.license_cache.size().await,
        })),
    )
}

pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

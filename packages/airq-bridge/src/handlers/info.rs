use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::record::LOG_FORMAT_VERSION;
use crate::router::AppState;
use crate::state::IngestStatsSnapshot;

const SERVICE_NAME: &str = "airq-bridge";

/// Static service description
#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
    pub service: String,
    pub version: String,
    pub endpoints: Vec<String>,
    pub log_format: u32,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub device_connected: bool,
    pub ingest: IngestStatsSnapshot,
}

pub async fn root_info() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Live CO2 sensor API is running".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: vec![
            "/live".to_string(),
            "/last_log".to_string(),
            "/health".to_string(),
        ],
        log_format: LOG_FORMAT_VERSION,
    })
}

/// Health check endpoint.
///
/// The bridge stays healthy while the device is unplugged; `device_connected`
/// tells callers whether `/live` is still being refreshed.
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let ingest = state.stats.snapshot();
    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        device_connected: ingest.connected,
        ingest,
    };

    (StatusCode::OK, Json(response))
}

pub async fn handle_404() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Not found" })),
    )
}

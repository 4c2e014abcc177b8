use axum::{routing::get, Router};
use axum::http::{HeaderValue, Method};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{get_last_log, get_live, handle_404, health_check, root_info};
use crate::record::DurableLog;
use crate::state::{IngestStats, SharedState};

/// State shared by all HTTP handlers
pub struct AppState {
    pub latest: SharedState,
    pub log: DurableLog,
    pub stats: Arc<IngestStats>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(latest: SharedState, log: DurableLog, stats: Arc<IngestStats>) -> Self {
        Self {
            latest,
            log,
            stats,
            start_time: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// CORS layer for the given origins; `*` allows any origin
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();
    cors.allow_origin(origins)
}

pub fn create_router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(root_info))
        .route("/live", get(get_live))
        .route("/last_log", get(get_last_log))
        .route("/health", get(health_check))
        .fallback(handle_404)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod router_tests;

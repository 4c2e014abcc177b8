use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::classify::AirStatus;
use crate::record::{DurableLog, LastRecord};
use crate::router::AppState;
use crate::state::LatestState;

/// Label reported by `/last_log` when there is nothing to read
pub const NO_DATA_LABEL: &str = "NoData";

/// Last durable record, in the log's own field names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastLogResponse {
    pub valor: Option<f64>,
    pub estado: String,
}

impl LastLogResponse {
    pub fn no_data() -> Self {
        Self {
            valor: None,
            estado: NO_DATA_LABEL.to_string(),
        }
    }

    pub fn unknown() -> Self {
        Self {
            valor: Some(0.0),
            estado: AirStatus::Unknown.to_string(),
        }
    }
}

impl From<LastRecord> for LastLogResponse {
    fn from(record: LastRecord) -> Self {
        match record {
            LastRecord::NoData => Self::no_data(),
            LastRecord::Malformed { line, reason } => {
                debug!("Unreadable log tail {:?}: {}", line, reason);
                Self::unknown()
            }
            LastRecord::Entry(entry) => Self {
                valor: Some(entry.value),
                estado: entry.status.to_string(),
            },
        }
    }
}

/// Latest published reading; never waits for the device
pub async fn get_live(State(state): State<Arc<AppState>>) -> Json<LatestState> {
    Json(state.latest.snapshot())
}

/// Reconstruct the last classification from the durable log.
///
/// Always answers 200: a missing log maps to the no-data sentinel, anything
/// unreadable to value 0 / `Unknown`.
pub async fn get_last_log(State(state): State<Arc<AppState>>) -> Json<LastLogResponse> {
    Json(read_last_log(&state.log).await)
}

/// Read the log tail, folding I/O errors into the `Unknown` sentinel
pub async fn read_last_log(log: &DurableLog) -> LastLogResponse {
    match log.read_last().await {
        Ok(record) => LastLogResponse::from(record),
        Err(e) => {
            warn!("Failed to read {}: {}", log.path().display(), e);
            LastLogResponse::unknown()
        }
    }
}

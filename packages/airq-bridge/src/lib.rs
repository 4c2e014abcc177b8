pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod reading;
pub mod record;
pub mod router;
pub mod source;
pub mod state;

pub use classify::{classify, AirStatus, Classification};
pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
pub use ingest::{IngestConfig, IngestHandle, IngestLoop};
pub use record::{DurableLog, LastRecord, LogEntry};
pub use router::{cors_layer, create_router, AppState};
pub use state::{IngestStats, LatestState, SharedState};

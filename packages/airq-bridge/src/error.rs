// Error types for the ingestion bridge

use thiserror::Error;

/// Result type for device and log operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors that can occur while talking to the device or the durable log
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Serial port error: {0}")]
    Serial(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

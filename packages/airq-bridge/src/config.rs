use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::ingest::IngestConfig;
use crate::source::{DeviceConnector, SerialConnector, TcpConnector};

/// Where the sensor is reached
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEndpoint {
    Serial { port: String, baud_rate: u32 },
    /// Serial-over-network bridge (host:port)
    Tcp { addr: String },
}

/// Bridge configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Device to read readings from
    pub device: DeviceEndpoint,
    /// Append-only reading log
    pub log_path: PathBuf,
    /// Pause after opening the device before trusting input
    pub settle_delay: Duration,
    /// Wait between device reconnect attempts
    pub retry_interval: Duration,
    /// HTTP port to listen on
    pub port: u16,
    /// HTTP bind address
    pub bind_addr: String,
    /// CORS allowed origins; "*" allows any
    pub cors_origins: Vec<String>,
}

impl BridgeConfig {
    /// Load configuration from environment variables (and `.env` if present)
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let device = match lookup("DEVICE_TCP_ADDR").filter(|s| !s.trim().is_empty()) {
            Some(addr) => DeviceEndpoint::Tcp {
                addr: addr.trim().to_string(),
            },
            None => DeviceEndpoint::Serial {
                port: lookup("ARD_PORT").unwrap_or_else(|| "/dev/ttyACM0".to_string()),
                baud_rate: parse_or(&lookup, "ARD_BAUD", 9600)?,
            },
        };

        let port = match lookup("AIRQ_PORT") {
            Some(v) => v.trim().parse().map_err(|_| ConfigError::InvalidPort)?,
            None => 8000,
        };

        Ok(Self {
            device,
            log_path: lookup("SENSOR_LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("sensor_log.txt")),
            settle_delay: Duration::from_millis(parse_or(&lookup, "SETTLE_DELAY_MS", 2000)?),
            retry_interval: Duration::from_millis(parse_or(&lookup, "RETRY_INTERVAL_MS", 2000)?),
            port,
            bind_addr: lookup("AIRQ_BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            cors_origins: lookup("CORS_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_else(|| vec!["*".to_string()]),
        })
    }

    /// Get the full bind address (addr:port)
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            settle_delay: self.settle_delay,
            retry_interval: self.retry_interval,
        }
    }

    /// Connector for the configured device endpoint
    pub fn connector(&self) -> Arc<dyn DeviceConnector> {
        match &self.device {
            DeviceEndpoint::Serial { port, baud_rate } => {
                Arc::new(SerialConnector::new(port.clone(), *baud_rate))
            }
            DeviceEndpoint::Tcp { addr } => Arc::new(TcpConnector::new(addr.clone())),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{} must be a number, got {:?}", key, v))),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

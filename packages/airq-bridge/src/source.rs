// Device connectors
//
// The ingestion loop reads the sensor through the `DeviceConnector` trait so
// the transport can be swapped without touching the loop:
// - Serial: the board on a local serial port (e.g. /dev/ttyACM0, COM6)
// - TCP: a serial-over-network bridge such as ser2net
//
// Tests plug in in-memory connectors.

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio_serial::SerialPortBuilderExt;

use crate::error::{BridgeError, BridgeResult};

/// Byte stream produced by a connector
pub type DeviceStream = Box<dyn AsyncRead + Send + Unpin>;

/// Opens a fresh byte stream to the sensor device.
///
/// `connect` is called once at startup and again after every connection
/// loss, so implementations must be able to reopen the endpoint.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn connect(&self) -> BridgeResult<DeviceStream>;

    /// Human-readable endpoint description for logs
    fn describe(&self) -> String;
}

/// Serial port connector
pub struct SerialConnector {
    port: String,
    baud_rate: u32,
}

impl SerialConnector {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
        }
    }
}

#[async_trait]
impl DeviceConnector for SerialConnector {
    async fn connect(&self) -> BridgeResult<DeviceStream> {
        let stream = tokio_serial::new(&self.port, self.baud_rate)
            .open_native_async()
            .map_err(|e| BridgeError::Serial(format!("Failed to open {}: {}", self.port, e)))?;

        Ok(Box::new(stream))
    }

    fn describe(&self) -> String {
        format!("serial {} @ {} baud", self.port, self.baud_rate)
    }
}

/// TCP connector for network serial bridges
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl DeviceConnector for TcpConnector {
    async fn connect(&self) -> BridgeResult<DeviceStream> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| BridgeError::Connection(format!("TCP connection to {} failed: {}", self.addr, e)))?;

        Ok(Box::new(stream))
    }

    fn describe(&self) -> String {
        format!("tcp {}", self.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_connector_reads_from_bridge() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"{\"CO2\": 512}\n").await.unwrap();
        });

        let connector = TcpConnector::new(addr.to_string());
        assert_eq!(connector.describe(), format!("tcp {}", addr));

        let mut stream = connector.connect().await.unwrap();
        let mut buf = String::new();
        stream.read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "{\"CO2\": 512}\n");
    }

    #[tokio::test]
    async fn test_tcp_connector_reports_refused_connection() {
        // Bind then drop to get a port with nothing listening
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let result = TcpConnector::new(addr.to_string()).connect().await;
        assert!(matches!(result, Err(BridgeError::Connection(_))));
    }

    #[tokio::test]
    async fn test_serial_connector_missing_port() {
        let connector = SerialConnector::new("/dev/airq-bridge-does-not-exist", 9600);
        assert_eq!(
            connector.describe(),
            "serial /dev/airq-bridge-does-not-exist @ 9600 baud"
        );
        assert!(matches!(
            connector.connect().await,
            Err(BridgeError::Serial(_))
        ));
    }
}

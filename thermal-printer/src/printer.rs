//! Printer transport for sending framed payloads
//!
//! Raw TCP (port 9100). Every payload gets its own connection: connect,
//! write everything, close. A stuck printer therefore never holds a socket
//! that a later job would have to share.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, instrument, warn};

use crate::error::{PrintError, PrintResult};

/// Default raw printing port
pub const RAW_PORT: u16 = 9100;

/// Trait for printer adapters
#[async_trait]
pub trait Printer: Send + Sync {
    /// Send a complete payload to the printer
    async fn print(&self, data: &[u8]) -> PrintResult<()>;

    /// Check if the printer is online/reachable
    async fn is_online(&self) -> bool;
}

/// Host and port of a networked printer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterTarget {
    pub host: String,
    pub port: u16,
}

impl PrinterTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port`, or a bare host on port 9100
    pub fn parse(addr: &str) -> PrintResult<Self> {
        let addr = addr.trim();
        let (host, port) = match addr.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| PrintError::InvalidConfig(format!("Invalid address: {}", addr)))?;
                (host, port)
            }
            None => (addr, RAW_PORT),
        };

        if host.is_empty() {
            return Err(PrintError::InvalidConfig(format!("Invalid address: {}", addr)));
        }
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for PrinterTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Where a transmission currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Connecting,
    Writing,
    Closed,
    Failed,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Idle => write!(f, "idle"),
            TransportState::Connecting => write!(f, "connecting"),
            TransportState::Writing => write!(f, "writing"),
            TransportState::Closed => write!(f, "closed"),
            TransportState::Failed => write!(f, "failed"),
        }
    }
}

/// Network printer (raw TCP)
#[derive(Debug, Clone)]
pub struct NetworkPrinter {
    target: PrinterTarget,
    timeout: Duration,
}

impl NetworkPrinter {
    /// Create a new network printer with a 10s deadline
    pub fn new(target: PrinterTarget) -> Self {
        Self {
            target,
            timeout: Duration::from_secs(10),
        }
    }

    /// Set the deadline, measured from the connection attempt
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the printer address
    pub fn target(&self) -> &PrinterTarget {
        &self.target
    }

    async fn transmit(&self, data: &[u8], state: &mut TransportState) -> PrintResult<()> {
        *state = TransportState::Connecting;
        let mut stream = TcpStream::connect((self.target.host.as_str(), self.target.port))
            .await
            .map_err(|e| PrintError::Connection(format!("{}: {}", self.target, e)))?;

        *state = TransportState::Writing;
        debug!("Connected, sending {} bytes", data.len());

        stream
            .write_all(data)
            .await
            .map_err(|e| PrintError::Write(format!("{}: {}", self.target, e)))?;
        stream
            .flush()
            .await
            .map_err(|e| PrintError::Write(format!("{}: flush: {}", self.target, e)))?;
        stream
            .shutdown()
            .await
            .map_err(|e| PrintError::Write(format!("{}: shutdown: {}", self.target, e)))?;

        *state = TransportState::Closed;
        Ok(())
    }
}

#[async_trait]
impl Printer for NetworkPrinter {
    #[instrument(skip(self, data), fields(addr = %self.target, data_len = data.len()))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        let mut state = TransportState::Idle;

        // Dropping the in-flight future on timeout drops the socket with it.
        let outcome = tokio::time::timeout(self.timeout, self.transmit(data, &mut state)).await;
        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(PrintError::Timeout(format!(
                "{} while {} after {}ms",
                self.target,
                state,
                self.timeout.as_millis()
            ))),
        };

        match &result {
            Ok(()) => info!("Print job sent successfully"),
            Err(e) => warn!(state = %state, error = %e, "Transmission {}", TransportState::Failed),
        }
        result
    }

    #[instrument(skip(self), fields(addr = %self.target))]
    async fn is_online(&self) -> bool {
        let check_timeout = Duration::from_millis(500);
        let connect = TcpStream::connect((self.target.host.as_str(), self.target.port));

        match tokio::time::timeout(check_timeout, connect).await {
            Ok(Ok(_)) => {
                info!("Printer online");
                true
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Printer offline");
                false
            }
            Err(_) => {
                warn!("Printer check timeout");
                false
            }
        }
    }
}

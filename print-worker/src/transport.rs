//! Delivery of encoded payloads

use std::time::Duration;

use async_trait::async_trait;
use thermal_printer::{NetworkPrinter, PrintResult, Printer, PrinterTarget};

/// Send a complete payload to a printer
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, payload: &[u8], target: &PrinterTarget) -> PrintResult<()>;
}

/// Raw TCP, one connection per payload
#[derive(Debug, Clone)]
pub struct TcpTransport {
    timeout: Duration,
}

impl TcpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, payload: &[u8], target: &PrinterTarget) -> PrintResult<()> {
        NetworkPrinter::new(target.clone())
            .with_timeout(self.timeout)
            .print(payload)
            .await
    }
}

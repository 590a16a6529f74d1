//! Error types for the printer library

use thiserror::Error;

/// Printer error types
#[derive(Debug, Error)]
pub enum PrintError {
    /// Image or raster cannot be encoded (zero area, oversized header fields)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// TCP connect refused, unreachable or unresolvable
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Connect or write exceeded the deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Socket-level failure while writing the payload
    #[error("Write failed: {0}")]
    Write(String),

    /// Invalid printer configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;

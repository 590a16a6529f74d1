//! Worker error types
//!
//! Job errors never leave the poll loop; they are turned into a status for
//! the queue. Queue errors are logged and the cycle moves on.

use thermal_printer::PrintError;
use thiserror::Error;

use crate::job::Stage;

/// External render step failures
#[derive(Debug, Error)]
pub enum RenderError {
    /// Render service unreachable or returned an error status
    #[error("Render service error: {0}")]
    Http(#[from] reqwest::Error),

    /// Rendered bytes are not a decodable image
    #[error("Image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    /// Renderer produced nothing printable
    #[error("Render produced no output")]
    Empty,

    /// Render call exceeded its deadline
    #[error("Render timed out after {0}ms")]
    Timeout(u128),

    /// Job carries no usable render source
    #[error("Unusable render source: {0}")]
    Source(String),
}

/// Failure of one job's pipeline
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Encoding failed: {0}")]
    Encoding(#[source] PrintError),

    #[error("Transmission failed: {0}")]
    Transmit(#[source] PrintError),

    /// The job's pipeline panicked
    #[error("Job panicked: {0}")]
    Panicked(String),
}

impl JobError {
    /// Pipeline stage the error came from
    pub fn stage(&self) -> Stage {
        match self {
            JobError::Render(_) => Stage::Render,
            JobError::Encoding(_) => Stage::Encode,
            JobError::Transmit(_) => Stage::Transmit,
            JobError::Panicked(_) => Stage::Internal,
        }
    }
}

/// Queue API failures
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Failures building the worker from configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid printer settings: {0}")]
    Printer(#[from] PrintError),

    #[error("HTTP client setup failed: {0}")]
    Client(#[from] reqwest::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Result type for one job's pipeline
pub type JobResult<T> = Result<T, JobError>;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

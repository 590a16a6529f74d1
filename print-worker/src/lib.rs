//! # print-worker
//!
//! Polls a print queue and drives each job through
//! render -> normalize/compose/binarize -> frame -> raw TCP.
//!
//! ```text
//! print-worker/src/
//! ├── config.rs     # Config::from_env, component wiring
//! ├── job.rs        # job model, status transition table
//! ├── queue.rs      # queue API + printer lookup
//! ├── render.rs     # remote / embedded / text renderers
//! ├── pipeline.rs   # render output -> payload
//! ├── transport.rs  # payload -> printer
//! └── worker.rs     # poll loop
//! ```
//!
//! The queue, printer lookup, renderer and transport are traits, so the
//! poll loop can be driven entirely in memory.

pub mod config;
pub mod error;
pub mod job;
pub mod logger;
pub mod pipeline;
pub mod queue;
pub mod render;
pub mod transport;
pub mod worker;

pub use config::{Config, RendererConfig, RendererKind};
pub use error::{ConfigError, JobError, JobResult, QueueError, QueueResult, RenderError};
pub use job::{JobStatus, Outcome, PrintJob, RenderSource, Stage, StatusPolicy, SuccessAction};
pub use logger::init_logger;
pub use pipeline::Pipeline;
pub use queue::{HttpPrinterDirectory, HttpQueue, JobQueue, PrinterDirectory, StaticPrinter};
pub use render::{
    EmbeddedImageRenderer, RemoteRenderer, RenderOutput, Renderer, TextRenderer, html_to_text,
};
pub use transport::{TcpTransport, Transport};
pub use worker::{CycleReport, PollTrigger, PrintWorker, WorkerSettings};

//! Job queue and printer directory clients
//!
//! The queue backend is a single endpoint taking `{"action": ...}` POSTs:
//! `get_all`, `set_status` and `delete`. The printer directory answers
//! `get_printer` on its own endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thermal_printer::PrinterTarget;
use tracing::{debug, instrument, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::{JobStatus, PrintJob, RenderSource};

/// Queue operations the worker consumes
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Jobs waiting to be printed
    async fn fetch_pending(&self) -> QueueResult<Vec<PrintJob>>;

    async fn set_status(&self, id: &str, status: JobStatus) -> QueueResult<()>;

    async fn delete_job(&self, id: &str) -> QueueResult<()>;
}

/// Source of the current printer address
#[async_trait]
pub trait PrinterDirectory: Send + Sync {
    /// Never fails: falls back to the configured target
    async fn printer_target(&self) -> PrinterTarget;
}

/// Printer directory that always answers the same target
#[derive(Debug, Clone)]
pub struct StaticPrinter(pub PrinterTarget);

#[async_trait]
impl PrinterDirectory for StaticPrinter {
    async fn printer_target(&self) -> PrinterTarget {
        self.0.clone()
    }
}

/// Queue item as the API returns it
#[derive(Debug, Deserialize)]
struct RawJob {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl RawJob {
    fn into_job(self) -> QueueResult<PrintJob> {
        let id = match self.id {
            Value::String(s) if !s.is_empty() => s,
            Value::Number(n) => n.to_string(),
            other => {
                return Err(QueueError::InvalidResponse(format!("bad job id: {}", other)));
            }
        };

        let source = match (self.html, self.data) {
            (Some(html), _) if !html.trim().is_empty() => RenderSource::Html(html),
            (_, Some(Value::String(s))) => match serde_json::from_str::<Value>(&s) {
                Ok(value) => RenderSource::Data(value),
                Err(e) => {
                    warn!(job_id = %id, error = %e, "Job data is not JSON, keeping it as a string");
                    RenderSource::Data(Value::String(s))
                }
            },
            (_, Some(Value::Null)) | (_, None) => RenderSource::Missing,
            (_, Some(value)) => RenderSource::Data(value),
        };

        let status = match self.status.as_deref() {
            Some(s) => s.parse().unwrap_or_else(|e: String| {
                warn!(job_id = %id, error = %e, "Unknown status, treating as pending");
                JobStatus::Pending
            }),
            None => JobStatus::Pending,
        };

        Ok(PrintJob {
            id,
            kind: self.kind,
            source,
            status,
        })
    }
}

#[derive(Debug, Deserialize)]
struct QueueResponse {
    #[serde(default)]
    data: Option<Vec<RawJob>>,
}

/// Parse a `get_all` response body into the jobs still pending
///
/// Malformed items are skipped so one bad row cannot stall the queue.
pub fn parse_queue(body: Value) -> QueueResult<Vec<PrintJob>> {
    let response: QueueResponse = serde_json::from_value(body)
        .map_err(|e| QueueError::InvalidResponse(format!("queue body: {}", e)))?;

    let jobs = response
        .data
        .unwrap_or_default()
        .into_iter()
        .filter_map(|raw| match raw.into_job() {
            Ok(job) => Some(job),
            Err(e) => {
                warn!(error = %e, "Skipping malformed queue item");
                None
            }
        })
        .filter(|job| job.status == JobStatus::Pending)
        .collect();

    Ok(jobs)
}

/// HTTP queue client
#[derive(Debug, Clone)]
pub struct HttpQueue {
    client: Client,
    url: String,
}

impl HttpQueue {
    pub fn new(url: impl Into<String>, timeout: Duration) -> QueueResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn post<T: DeserializeOwned>(&self, body: &Value) -> QueueResult<T> {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl JobQueue for HttpQueue {
    #[instrument(skip(self))]
    async fn fetch_pending(&self) -> QueueResult<Vec<PrintJob>> {
        let body: Value = self.post(&json!({ "action": "get_all" })).await?;
        let jobs = parse_queue(body)?;
        debug!(count = jobs.len(), "Fetched queue");
        Ok(jobs)
    }

    #[instrument(skip(self))]
    async fn set_status(&self, id: &str, status: JobStatus) -> QueueResult<()> {
        let _: Value = self
            .post(&json!({ "action": "set_status", "id": id, "status": status }))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_job(&self, id: &str) -> QueueResult<()> {
        let _: Value = self.post(&json!({ "action": "delete", "id": id })).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct PrinterResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<PrinterData>,
}

#[derive(Debug, Deserialize)]
struct PrinterData {
    ip: String,
    port: Value,
}

/// Parse a `get_printer` response body
pub fn parse_printer(body: Value) -> QueueResult<PrinterTarget> {
    let response: PrinterResponse = serde_json::from_value(body)
        .map_err(|e| QueueError::InvalidResponse(format!("printer body: {}", e)))?;

    let data = match response.data {
        Some(data) if response.success => data,
        _ => {
            return Err(QueueError::InvalidResponse(
                "printer lookup unsuccessful".to_string(),
            ));
        }
    };

    let port = match &data.port {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| QueueError::InvalidResponse(format!("bad printer port: {}", data.port)))?;

    if data.ip.trim().is_empty() {
        return Err(QueueError::InvalidResponse("empty printer ip".to_string()));
    }
    Ok(PrinterTarget::new(data.ip.trim(), port))
}

/// Printer directory backed by the settings endpoint
#[derive(Debug, Clone)]
pub struct HttpPrinterDirectory {
    client: Client,
    url: String,
    fallback: PrinterTarget,
}

impl HttpPrinterDirectory {
    pub fn new(url: impl Into<String>, fallback: PrinterTarget, timeout: Duration) -> QueueResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            fallback,
        })
    }

    async fn lookup(&self) -> QueueResult<PrinterTarget> {
        let body: Value = self
            .client
            .post(&self.url)
            .json(&json!({ "action": "get_printer" }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_printer(body)
    }
}

#[async_trait]
impl PrinterDirectory for HttpPrinterDirectory {
    async fn printer_target(&self) -> PrinterTarget {
        match self.lookup().await {
            Ok(target) => target,
            Err(e) => {
                warn!(error = %e, fallback = %self.fallback, "Printer lookup failed, using fallback");
                self.fallback.clone()
            }
        }
    }
}

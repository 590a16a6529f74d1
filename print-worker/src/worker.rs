//! Job lifecycle controller
//!
//! Polls the queue on a fixed interval, or early when poked through a
//! [`PollTrigger`], and runs every pending job through
//! render -> encode -> transmit, one at a time. A trigger that arrives while
//! a cycle is running is remembered (once) and starts another cycle right
//! after, so at most one payload is ever in flight to the printer.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use thermal_printer::PrinterTarget;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::error::{JobError, JobResult, RenderError};
use crate::job::{JobStatus, Outcome, PrintJob, StatusPolicy, SuccessAction};
use crate::pipeline::Pipeline;
use crate::queue::{JobQueue, PrinterDirectory};
use crate::render::Renderer;
use crate::transport::Transport;

/// Loop timing and status policy
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub poll_interval: Duration,
    pub render_timeout: Duration,
    /// Pause after each job so the printer drains before the next connection
    pub job_gap: Duration,
    pub policy: StatusPolicy,
    pub success_action: SuccessAction,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2000),
            render_timeout: Duration::from_millis(15000),
            job_gap: Duration::from_millis(200),
            policy: StatusPolicy::default(),
            success_action: SuccessAction::default(),
        }
    }
}

/// Counts for one poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub printed: usize,
    pub failed: usize,
    /// Jobs left untouched because they could not be claimed
    pub skipped: usize,
}

/// Handle for requesting an early poll
///
/// Any number of triggers while a cycle is running, together with a timer
/// tick that fell due meanwhile, collapse into one follow-up cycle.
#[derive(Debug, Clone)]
pub struct PollTrigger(Arc<Notify>);

impl PollTrigger {
    pub fn trigger(&self) {
        self.0.notify_one();
    }
}

/// The single print worker
pub struct PrintWorker {
    queue: Arc<dyn JobQueue>,
    directory: Arc<dyn PrinterDirectory>,
    renderer: Arc<dyn Renderer>,
    transport: Arc<dyn Transport>,
    pipeline: Pipeline,
    settings: WorkerSettings,
    wake: Arc<Notify>,
    /// Failed attempts per job id, kept only under an attempt ceiling
    failures: HashMap<String, u32>,
}

impl PrintWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        directory: Arc<dyn PrinterDirectory>,
        renderer: Arc<dyn Renderer>,
        transport: Arc<dyn Transport>,
        pipeline: Pipeline,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            directory,
            renderer,
            transport,
            pipeline,
            settings,
            wake: Arc::new(Notify::new()),
            failures: HashMap::new(),
        }
    }

    pub fn trigger(&self) -> PollTrigger {
        PollTrigger(self.wake.clone())
    }

    /// Run until `shutdown` fires (checked between cycles)
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!(
            interval_ms = self.settings.poll_interval.as_millis() as u64,
            mode = %self.pipeline.framer.mode(),
            "Print worker started"
        );

        let wake = self.wake.clone();
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("Print worker received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {}
                _ = wake.notified() => {
                    tracing::debug!("Poll triggered");
                }
            }

            self.run_cycle().await;

            // A tick that fell due during the cycle shares the trigger's permit
            if ticker.tick().now_or_never().is_some() {
                ticker.reset();
                wake.notify_one();
            }
        }
    }

    /// Fetch the queue once and process every pending job in order
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        let jobs = match self.queue.fetch_pending().await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch queue");
                return report;
            }
        };
        report.fetched = jobs.len();
        self.failures.retain(|id, _| jobs.iter().any(|job| &job.id == id));
        if jobs.is_empty() {
            return report;
        }

        let target = self.directory.printer_target().await;
        tracing::debug!(count = jobs.len(), addr = %target, "Processing queue");

        for job in jobs {
            match self.handle(job, &target).await {
                Some(Outcome::Printed) => report.printed += 1,
                Some(Outcome::Failed(_)) => report.failed += 1,
                None => {
                    report.skipped += 1;
                    continue;
                }
            }
            if !self.settings.job_gap.is_zero() {
                tokio::time::sleep(self.settings.job_gap).await;
            }
        }

        tracing::info!(
            fetched = report.fetched,
            printed = report.printed,
            failed = report.failed,
            skipped = report.skipped,
            "Poll cycle finished"
        );
        report
    }

    /// Claim, process and settle one job; `None` when it could not be claimed
    async fn handle(&mut self, job: PrintJob, target: &PrinterTarget) -> Option<Outcome> {
        if let Err(e) = self.queue.set_status(&job.id, JobStatus::Processing).await {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to claim job, leaving it for next poll");
            return None;
        }

        let result = AssertUnwindSafe(self.process_job(&job, target))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(JobError::Panicked(panic_message(panic))));

        let outcome = match &result {
            Ok(()) => Outcome::Printed,
            Err(e) => Outcome::Failed(e.stage()),
        };
        let failures = match outcome {
            Outcome::Printed => {
                self.failures.remove(&job.id);
                0
            }
            Outcome::Failed(_) if self.settings.policy.max_attempts.is_some() => {
                let count = self.failures.entry(job.id.clone()).or_insert(0);
                *count += 1;
                *count
            }
            Outcome::Failed(_) => 1,
        };
        let next = self.settings.policy.next(outcome, failures);

        match result {
            Ok(()) => {
                tracing::info!(job_id = %job.id, "Job printed");
                self.settle_success(&job.id).await;
            }
            Err(e) => {
                tracing::error!(
                    job_id = %job.id,
                    stage = %e.stage(),
                    attempt = failures,
                    next = %next,
                    error = %e,
                    "Job failed"
                );
                if next == JobStatus::Error {
                    self.failures.remove(&job.id);
                }
                if let Err(e) = self.queue.set_status(&job.id, next).await {
                    tracing::warn!(job_id = %job.id, status = %next, error = %e, "Failed to report job status");
                }
            }
        }

        Some(outcome)
    }

    async fn settle_success(&self, id: &str) {
        if self.settings.success_action == SuccessAction::Delete {
            match self.queue.delete_job(id).await {
                Ok(()) => return,
                Err(e) => {
                    tracing::warn!(job_id = %id, error = %e, "Failed to delete printed job, marking it done");
                }
            }
        }

        if let Err(e) = self.queue.set_status(id, JobStatus::Done).await {
            tracing::warn!(job_id = %id, error = %e, "Failed to mark job done");
        }
    }

    /// Render, encode and transmit one job
    #[instrument(skip(self, job, target), fields(job_id = %job.id, addr = %target))]
    async fn process_job(&self, job: &PrintJob, target: &PrinterTarget) -> JobResult<()> {
        let timeout = self.settings.render_timeout;
        let output = tokio::time::timeout(timeout, self.renderer.render(job))
            .await
            .map_err(|_| RenderError::Timeout(timeout.as_millis()))??;

        let payload = self.pipeline.encode(&job.id, output)?;

        self.transport
            .send(&payload, target)
            .await
            .map_err(JobError::Transmit)
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueueResult;
    use crate::queue::StaticPrinter;
    use crate::render::RenderOutput;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use thermal_printer::{Framer, PrintResult, TsplRasterFramer};

    /// Queue whose pending set is replaced by the test between cycles
    #[derive(Default)]
    struct ListQueue(Mutex<Vec<String>>);

    #[async_trait]
    impl JobQueue for ListQueue {
        async fn fetch_pending(&self) -> QueueResult<Vec<PrintJob>> {
            let ids = self.0.lock().unwrap();
            Ok(ids
                .iter()
                .map(|id| PrintJob {
                    id: id.clone(),
                    kind: None,
                    source: crate::job::RenderSource::Missing,
                    status: JobStatus::Pending,
                })
                .collect())
        }

        async fn set_status(&self, _id: &str, _status: JobStatus) -> QueueResult<()> {
            Ok(())
        }

        async fn delete_job(&self, _id: &str) -> QueueResult<()> {
            Ok(())
        }
    }

    struct FailingRenderer;

    #[async_trait]
    impl Renderer for FailingRenderer {
        async fn render(&self, _job: &PrintJob) -> Result<RenderOutput, RenderError> {
            Err(RenderError::Empty)
        }
    }

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn send(&self, _payload: &[u8], _target: &PrinterTarget) -> PrintResult<()> {
            Ok(())
        }
    }

    fn failing_worker(queue: Arc<ListQueue>, max_attempts: Option<u32>) -> PrintWorker {
        let settings = WorkerSettings {
            job_gap: Duration::ZERO,
            policy: StatusPolicy {
                max_attempts,
                ..Default::default()
            },
            ..Default::default()
        };
        PrintWorker::new(
            queue,
            Arc::new(StaticPrinter(PrinterTarget::new("127.0.0.1", 9100))),
            Arc::new(FailingRenderer),
            Arc::new(NullTransport),
            Pipeline::new(Framer::TsplRaster(TsplRasterFramer::default())),
            settings,
        )
    }

    #[tokio::test]
    async fn test_failures_untracked_without_ceiling() {
        let queue = Arc::new(ListQueue(Mutex::new(vec!["1".into(), "2".into()])));
        let mut worker = failing_worker(queue, None);

        assert_eq!(worker.run_cycle().await.failed, 2);
        assert!(worker.failures.is_empty());
    }

    #[tokio::test]
    async fn test_failures_forgotten_when_job_leaves_queue() {
        let queue = Arc::new(ListQueue(Mutex::new(vec!["1".into(), "2".into()])));
        let mut worker = failing_worker(queue.clone(), Some(5));

        worker.run_cycle().await;
        assert_eq!(worker.failures.len(), 2);

        // "1" was deleted upstream while pending
        *queue.0.lock().unwrap() = vec!["2".to_string()];
        worker.run_cycle().await;

        assert!(!worker.failures.contains_key("1"));
        assert_eq!(worker.failures.get("2"), Some(&2));
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(7_u8)), "unknown panic");
    }

    #[tokio::test]
    async fn test_trigger_coalesces_into_one_permit() {
        let notify = Arc::new(Notify::new());
        let trigger = PollTrigger(notify.clone());

        trigger.trigger();
        trigger.trigger();

        notify.notified().await;
        let second = tokio::time::timeout(Duration::from_millis(50), notify.notified()).await;
        assert!(second.is_err());
    }
}

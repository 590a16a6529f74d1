//! Print job model and status transitions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Job status as the queue API spells it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    /// Dequeued by a worker; `printing` on the wire
    #[serde(rename = "printing", alias = "processing")]
    Processing,
    Done,
    Error,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "printing"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Error => write!(f, "error"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "printing" | "processing" => Ok(JobStatus::Processing),
            "done" => Ok(JobStatus::Done),
            "error" => Ok(JobStatus::Error),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Material the renderer turns into an image or text
#[derive(Debug, Clone, PartialEq)]
pub enum RenderSource {
    /// Receipt/label HTML
    Html(String),
    /// Pre-structured data (already JSON-decoded when it arrived as a string)
    Data(serde_json::Value),
    /// Nothing usable was attached
    Missing,
}

/// One unit of print work, owned by the external queue
#[derive(Debug, Clone, PartialEq)]
pub struct PrintJob {
    pub id: String,
    /// Template kind (`order`, `request`, ...) when the queue sends one
    pub kind: Option<String>,
    pub source: RenderSource,
    pub status: JobStatus,
}

/// Pipeline stage a failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Render,
    Encode,
    Transmit,
    Internal,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Render => write!(f, "render"),
            Stage::Encode => write!(f, "encode"),
            Stage::Transmit => write!(f, "transmit"),
            Stage::Internal => write!(f, "internal"),
        }
    }
}

/// Terminal result of one processing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Printed,
    Failed(Stage),
}

/// What happens to a job after it printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuccessAction {
    /// Remove the job from the queue
    #[default]
    Delete,
    /// Keep the job, marked `done`
    MarkDone,
}

impl FromStr for SuccessAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delete" => Ok(SuccessAction::Delete),
            "mark-done" | "done" => Ok(SuccessAction::MarkDone),
            other => Err(format!("unknown success action: {}", other)),
        }
    }
}

/// Status transition table: (outcome, attempts so far) -> next status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPolicy {
    pub on_render_failure: JobStatus,
    pub on_encode_failure: JobStatus,
    pub on_transmit_failure: JobStatus,
    pub on_internal_failure: JobStatus,
    /// Failed attempts after which a retryable job becomes `error`
    pub max_attempts: Option<u32>,
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self {
            on_render_failure: JobStatus::Pending,
            on_encode_failure: JobStatus::Pending,
            on_transmit_failure: JobStatus::Pending,
            on_internal_failure: JobStatus::Pending,
            max_attempts: None,
        }
    }
}

impl StatusPolicy {
    /// Status to report for a job leaving `processing`
    ///
    /// `failures` counts failed attempts including this one.
    pub fn next(&self, outcome: Outcome, failures: u32) -> JobStatus {
        let stage = match outcome {
            Outcome::Printed => return JobStatus::Done,
            Outcome::Failed(stage) => stage,
        };

        let status = match stage {
            Stage::Render => self.on_render_failure,
            Stage::Encode => self.on_encode_failure,
            Stage::Transmit => self.on_transmit_failure,
            Stage::Internal => self.on_internal_failure,
        };

        match (status, self.max_attempts) {
            (JobStatus::Pending, Some(max)) if failures >= max => JobStatus::Error,
            (status, _) => status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&JobStatus::Processing).unwrap(), "\"printing\"");
        assert_eq!(
            serde_json::from_str::<JobStatus>("\"processing\"").unwrap(),
            JobStatus::Processing
        );
        assert_eq!(serde_json::from_str::<JobStatus>("\"done\"").unwrap(), JobStatus::Done);
        assert_eq!("ERROR".parse::<JobStatus>().unwrap(), JobStatus::Error);
    }

    #[test]
    fn test_printed_is_done() {
        let policy = StatusPolicy::default();
        assert_eq!(policy.next(Outcome::Printed, 0), JobStatus::Done);
    }

    #[test]
    fn test_failures_retry_by_default() {
        let policy = StatusPolicy::default();
        for stage in [Stage::Render, Stage::Encode, Stage::Transmit, Stage::Internal] {
            assert_eq!(policy.next(Outcome::Failed(stage), 1), JobStatus::Pending);
        }
    }

    #[test]
    fn test_render_failure_can_be_terminal() {
        let policy = StatusPolicy {
            on_render_failure: JobStatus::Error,
            ..Default::default()
        };
        assert_eq!(policy.next(Outcome::Failed(Stage::Render), 1), JobStatus::Error);
        assert_eq!(policy.next(Outcome::Failed(Stage::Transmit), 1), JobStatus::Pending);
    }

    #[test]
    fn test_attempt_ceiling() {
        let policy = StatusPolicy {
            max_attempts: Some(3),
            ..Default::default()
        };
        assert_eq!(policy.next(Outcome::Failed(Stage::Transmit), 2), JobStatus::Pending);
        assert_eq!(policy.next(Outcome::Failed(Stage::Transmit), 3), JobStatus::Error);
    }

    #[test]
    fn test_success_action_parse() {
        assert_eq!("delete".parse::<SuccessAction>().unwrap(), SuccessAction::Delete);
        assert_eq!("mark-done".parse::<SuccessAction>().unwrap(), SuccessAction::MarkDone);
        assert!("archive".parse::<SuccessAction>().is_err());
    }
}

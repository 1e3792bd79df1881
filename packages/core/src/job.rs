//! Job identity and execution-state types for the request queue.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Opaque ticket attached to every enqueued job, used for logs and events.
///
/// Scheduling never looks at it: order is FIFO and at most one job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display name of a job's operation, reported by the status tracker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobName(String);

impl JobName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for JobName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl std::fmt::Display for JobName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failure of a job's operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    /// The operation returned an error.
    #[error("{0}")]
    Failed(String),

    /// The operation panicked while running.
    #[error("job panicked: {0}")]
    Panicked(String),
}

impl JobError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// What happened to a job once the worker finished with it.
///
/// The worker discards this after logging; it exists so the
/// failure path is a value rather than a swallowed error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { duration: Duration },
    Failed { duration: Duration, error: JobError },
}

impl JobOutcome {
    pub fn from_result(result: Result<(), JobError>, duration: Duration) -> Self {
        match result {
            Ok(()) => JobOutcome::Completed { duration },
            Err(error) => JobOutcome::Failed { duration, error },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Completed { .. })
    }

    pub fn duration(&self) -> Duration {
        match self {
            JobOutcome::Completed { duration } | JobOutcome::Failed { duration, .. } => *duration,
        }
    }

    /// Get a simple outcome string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Completed { .. } => "completed",
            JobOutcome::Failed { .. } => "failed",
        }
    }
}

/// Point-in-time view of the job currently held by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub id: JobId,
    pub name: JobName,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
}

/// Point-in-time view of the whole queue, suitable for rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Jobs waiting behind the current one.
    pub pending: usize,
    /// The executing job, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<ExecutionSnapshot>,
}

impl QueueStatus {
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.current.is_none()
    }

    pub fn current_job_name(&self) -> Option<&JobName> {
        self.current.as_ref().map(|c| &c.name)
    }

    /// Seconds the current job has been running, 0 when idle.
    pub fn elapsed_secs(&self) -> f64 {
        self.current.as_ref().map_or(0.0, |c| c.elapsed_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_keeps_error() {
        let outcome = JobOutcome::from_result(
            Err(JobError::failed("model not found")),
            Duration::from_millis(15),
        );
        assert!(!outcome.is_success());
        assert_eq!(outcome.as_str(), "failed");
        assert_eq!(outcome.duration(), Duration::from_millis(15));
        match outcome {
            JobOutcome::Failed { error, .. } => assert_eq!(error.to_string(), "model not found"),
            JobOutcome::Completed { .. } => panic!("expected failure"),
        }
    }

    #[test]
    fn idle_status_reports_nothing() {
        let status = QueueStatus::default();
        assert!(status.is_idle());
        assert_eq!(status.current_job_name(), None);
        assert_eq!(status.elapsed_secs(), 0.0);
    }
}

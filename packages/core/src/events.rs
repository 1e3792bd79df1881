//! Events emitted by the request queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobId, JobName};

/// Lifecycle events for jobs passing through the request queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A job was appended to the queue.
    JobEnqueued {
        job_id: JobId,
        name: JobName,
        /// Pending jobs after this one was added.
        position: usize,
        timestamp: DateTime<Utc>,
    },
    /// The worker took a job off the queue and started it.
    JobStarted {
        job_id: JobId,
        name: JobName,
        timestamp: DateTime<Utc>,
    },
    /// A job's operation finished without error.
    JobCompleted {
        job_id: JobId,
        name: JobName,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// A job's operation returned an error or panicked.
    JobFailed {
        job_id: JobId,
        name: JobName,
        error: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

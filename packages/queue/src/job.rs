//! Jobs: named, ready-to-run operations handed to the request queue.

use std::future::Future;
use std::pin::Pin;

use bot_core::{JobError, JobId, JobName};
use chrono::{DateTime, Utc};

/// Result type for job operations.
pub type JobResult = Result<(), JobError>;

/// Future type for async job operations.
pub type JobFuture = Pin<Box<dyn Future<Output = JobResult> + Send>>;

type Operation = Box<dyn FnOnce() -> JobFuture + Send>;

/// A unit of enqueued work.
///
/// The operation is a closure that owns everything it needs, including how
/// to report its own result back to whoever asked for it. The queue only
/// runs it; it never inspects what the closure captured.
pub struct Job {
    id: JobId,
    name: JobName,
    enqueued_at: DateTime<Utc>,
    operation: Operation,
}

impl Job {
    /// Create a job from an async closure.
    ///
    /// The closure is not called until the worker takes the job, so a panic
    /// while building the future is caught like any other job failure.
    pub fn new<F, Fut>(name: impl Into<JobName>, operation: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        Self {
            id: JobId::new(),
            name: name.into(),
            enqueued_at: Utc::now(),
            operation: Box::new(move || Box::pin(operation()) as JobFuture),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn name(&self) -> &JobName {
        &self.name
    }

    /// Split into identity and the operation, consuming the job.
    pub(crate) fn into_parts(self) -> (JobId, JobName, impl FnOnce() -> JobFuture + Send) {
        (self.id, self.name, self.operation)
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("enqueued_at", &self.enqueued_at)
            .finish_non_exhaustive()
    }
}

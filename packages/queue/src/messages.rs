//! Message and error types for actor communication.

use ractor::RpcReplyPort;

use crate::job::Job;

/// Messages for the QueueActor.
#[derive(Debug)]
pub enum QueueMessage {
    /// Append a job to the tail of the queue.
    Enqueue { job: Box<Job> },

    /// Hand the head job to the worker.
    ///
    /// Answered immediately when a job is pending; otherwise the reply port
    /// is parked and answered by the next `Enqueue`.
    Dequeue { reply: RpcReplyPort<Job> },

    /// Stop the queue, dropping pending jobs.
    Shutdown,
}

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Take the next job from the queue and run it.
    Next,
}

/// Error type for request queue operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Request queue is closed")]
    Closed,

    #[error("Worker already started")]
    WorkerAlreadyStarted,

    #[error("Failed to spawn actor: {0}")]
    Spawn(String),
}

impl From<ractor::SpawnErr> for QueueError {
    fn from(err: ractor::SpawnErr) -> Self {
        QueueError::Spawn(err.to_string())
    }
}

impl<T> From<ractor::MessagingErr<T>> for QueueError {
    fn from(_: ractor::MessagingErr<T>) -> Self {
        QueueError::Closed
    }
}

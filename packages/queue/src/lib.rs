//! Single-worker request queue for long-running generation jobs.
//!
//! This crate provides the Ractor-based actors that serialize jobs and the
//! read-only status surface callers poll while a job runs.
//!
//! # Architecture
//!
//! - `QueueActor` - Owns the FIFO of pending jobs
//! - `WorkerActor` - The only consumer; runs one job at a time
//! - `StatusTracker` - Queue depth, current job name and elapsed time
//!
//! # Usage
//!
//! ```ignore
//! use request_queue::{Job, RequestQueue};
//!
//! let (queue, worker) = RequestQueue::start().await?;
//! queue.enqueue(Job::new("generate_image", move || async move {
//!     render().await.map_err(|e| JobError::failed(e.to_string()))
//! }))?;
//! println!("{} waiting, running {:?}", queue.size(), queue.current_job_name());
//! ```

mod job;
mod messages;
mod queue_actor;
mod status;
mod worker_actor;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bot_core::{JobId, JobName, QueueEvent, QueueStatus};
use chrono::Utc;
use ractor::{Actor, ActorRef};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use ulid::Ulid;

pub use job::{Job, JobFuture, JobResult};
pub use messages::{QueueError, QueueMessage, WorkerMessage};
pub use queue_actor::{QueueActor, QueueActorState};
pub use status::StatusTracker;
pub use worker_actor::{WorkerActor, WorkerArgs};

/// Capacity of the event channel; slow subscribers lag rather than block.
const EVENT_CAPACITY: usize = 256;

/// Handle to a running request queue. Cheap to clone.
#[derive(Clone)]
pub struct RequestQueue {
    actor: ActorRef<QueueMessage>,
    status: StatusTracker,
    event_tx: broadcast::Sender<QueueEvent>,
    worker_started: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    name: Arc<str>,
}

/// Handle to the worker actor, used to wait for it to stop.
pub struct WorkerHandle {
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    /// Wait for the worker to stop.
    ///
    /// The worker stops once the queue is shut down and its in-flight job,
    /// if any, has finished.
    pub async fn wait(self) {
        if let Err(e) = self.handle.await {
            tracing::warn!("Worker task ended abnormally: {}", e);
        }
    }
}

impl RequestQueue {
    /// Spawn the queue actor without a worker. Jobs accumulate until
    /// [`RequestQueue::start_worker`] is called.
    pub async fn spawn() -> Result<Self, QueueError> {
        let status = StatusTracker::new();
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let name: Arc<str> = format!("request-queue-{}", Ulid::new()).into();

        let (actor, _handle) = Actor::spawn(
            Some(name.to_string()),
            QueueActor,
            QueueActorState::new(status.clone()),
        )
        .await?;

        Ok(Self {
            actor,
            status,
            event_tx,
            worker_started: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
            name,
        })
    }

    /// Spawn the queue and its worker.
    pub async fn start() -> Result<(Self, WorkerHandle), QueueError> {
        let queue = Self::spawn().await?;
        let worker = queue.start_worker().await?;
        Ok((queue, worker))
    }

    /// Start the single worker. Fails if a worker was already started.
    pub async fn start_worker(&self) -> Result<WorkerHandle, QueueError> {
        if self.worker_started.swap(true, Ordering::SeqCst) {
            return Err(QueueError::WorkerAlreadyStarted);
        }

        let args = WorkerArgs {
            queue: self.actor.clone(),
            status: self.status.clone(),
            event_tx: self.event_tx.clone(),
        };

        match Actor::spawn(Some(format!("{}-worker", self.name)), WorkerActor, args).await {
            Ok((_actor, handle)) => Ok(WorkerHandle { handle }),
            Err(e) => {
                self.worker_started.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// Append a job to the tail of the queue. Never blocks.
    pub fn enqueue(&self, job: Job) -> Result<JobId, QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }

        let job_id = job.id();
        let name = job.name().clone();
        let position = self.status.job_enqueued();

        if let Err(e) = self.actor.send_message(QueueMessage::Enqueue { job: Box::new(job) }) {
            self.status.enqueue_rejected();
            return Err(e.into());
        }

        tracing::debug!("Job {} ({}) enqueued at position {}", job_id, name, position);
        let _ = self.event_tx.send(QueueEvent::JobEnqueued {
            job_id,
            name,
            position,
            timestamp: Utc::now(),
        });

        Ok(job_id)
    }

    /// Number of jobs waiting, excluding the one running.
    pub fn size(&self) -> usize {
        self.status.size()
    }

    /// Name of the running job, `None` while idle.
    pub fn current_job_name(&self) -> Option<JobName> {
        self.status.current_job_name()
    }

    /// Seconds since the running job started; 0 while idle.
    pub fn elapsed_seconds(&self) -> f64 {
        self.status.elapsed_seconds()
    }

    /// Snapshot of depth and the running job.
    pub fn status(&self) -> QueueStatus {
        self.status.snapshot()
    }

    /// Read-only status handle for pollers.
    pub fn status_tracker(&self) -> StatusTracker {
        self.status.clone()
    }

    /// Whether [`RequestQueue::shutdown`] was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Subscribe to job lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.event_tx.subscribe()
    }

    /// Wait until every job enqueued so far has finished.
    pub async fn join(&self) {
        self.status.wait_drained().await;
    }

    /// Stop accepting jobs and drop the pending ones. The running job is
    /// left to finish; the worker stops after it.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if self.actor.send_message(QueueMessage::Shutdown).is_err() {
            tracing::debug!("Request queue already stopped");
        }
    }
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQueue")
            .field("name", &self.name)
            .field("status", &self.status.snapshot())
            .finish()
    }
}

//! Worker actor: the single consumer that runs jobs one at a time.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use bot_core::{JobError, JobOutcome, QueueEvent};
use chrono::Utc;
use futures_util::FutureExt;
use ractor::rpc::CallResult;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::broadcast;

use crate::job::Job;
use crate::messages::{QueueMessage, WorkerMessage};
use crate::status::StatusTracker;

/// Worker actor arguments.
pub struct WorkerArgs {
    pub queue: ActorRef<QueueMessage>,
    pub status: StatusTracker,
    pub event_tx: broadcast::Sender<QueueEvent>,
}

/// State for the worker actor.
pub struct WorkerActorState {
    queue: ActorRef<QueueMessage>,
    status: StatusTracker,
    event_tx: broadcast::Sender<QueueEvent>,
    /// Jobs finished since start, either way.
    processed: u64,
    failed: u64,
}

impl WorkerActorState {
    fn new(args: WorkerArgs) -> Self {
        Self {
            queue: args.queue,
            status: args.status,
            event_tx: args.event_tx,
            processed: 0,
            failed: 0,
        }
    }

    fn broadcast(&self, event: QueueEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    /// Run one job to completion. Errors and panics end up in the outcome;
    /// nothing a job does can stop the worker.
    async fn run(&mut self, job: Job) -> JobOutcome {
        let (job_id, name, operation) = job.into_parts();

        self.status.job_started(job_id, name.clone());
        self.broadcast(QueueEvent::JobStarted {
            job_id,
            name: name.clone(),
            timestamp: Utc::now(),
        });
        tracing::debug!("Job {} ({}) started", job_id, name);

        let started = Instant::now();
        let result = AssertUnwindSafe(async move { operation().await })
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(JobError::Panicked(panic_message(panic.as_ref()))));
        let outcome = JobOutcome::from_result(result, started.elapsed());
        self.processed += 1;

        let duration_ms = outcome.duration().as_millis() as u64;
        match &outcome {
            JobOutcome::Completed { .. } => {
                tracing::debug!("Job {} ({}) completed in {}ms", job_id, name, duration_ms);
                self.broadcast(QueueEvent::JobCompleted {
                    job_id,
                    name,
                    duration_ms,
                    timestamp: Utc::now(),
                });
            }
            JobOutcome::Failed { error, .. } => {
                self.failed += 1;
                tracing::warn!("Job {} ({}) failed after {}ms: {}", job_id, name, duration_ms, error);
                self.broadcast(QueueEvent::JobFailed {
                    job_id,
                    name,
                    error: error.to_string(),
                    duration_ms,
                    timestamp: Utc::now(),
                });
            }
        }

        // The terminal event is out before drainage waiters wake.
        self.status.job_finished();
        outcome
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Worker actor that executes jobs.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting request queue worker");
        Ok(WorkerActorState::new(args))
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        myself.send_message(WorkerMessage::Next)?;
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(
            "Worker stopped after {} jobs ({} failed)",
            state.processed,
            state.failed
        );
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Next => {
                // Suspends here until the queue has a job for us.
                let result = ractor::rpc::call(
                    &state.queue,
                    |reply| QueueMessage::Dequeue { reply },
                    None,
                )
                .await;

                let job = match result {
                    Ok(CallResult::Success(job)) => job,
                    _ => {
                        tracing::info!("Request queue closed, stopping worker");
                        myself.stop(None);
                        return Ok(());
                    }
                };

                state.run(job).await;

                if myself.send_message(WorkerMessage::Next).is_err() {
                    tracing::debug!("Worker mailbox closed");
                }
            }
        }

        Ok(())
    }
}

//! Queue actor owning the FIFO of pending jobs.

use std::collections::VecDeque;

use ractor::{Actor, ActorProcessingErr, ActorRef, MessagingErr, RpcReplyPort};

use crate::job::Job;
use crate::messages::QueueMessage;
use crate::status::StatusTracker;

/// State for the queue actor.
pub struct QueueActorState {
    /// Pending jobs in arrival order.
    pending: VecDeque<Job>,
    /// The worker's dequeue request, parked while the queue is empty.
    waiting_worker: Option<RpcReplyPort<Job>>,
    /// Set once `Shutdown` is handled; the mailbox is being drained.
    stopping: bool,
    status: StatusTracker,
}

impl QueueActorState {
    pub fn new(status: StatusTracker) -> Self {
        Self {
            pending: VecDeque::new(),
            waiting_worker: None,
            stopping: false,
            status,
        }
    }

    /// Hand a job to the worker, putting it back at the head if the worker
    /// went away in the meantime.
    fn hand_over(&mut self, reply: RpcReplyPort<Job>, job: Job) {
        let job_id = job.id();
        match reply.send(job) {
            Ok(()) => tracing::debug!("Handed job {} to worker", job_id),
            Err(MessagingErr::SendErr(job)) => {
                tracing::warn!("Worker dropped its request, keeping job {}", job_id);
                self.pending.push_front(job);
            }
            Err(e) => {
                tracing::warn!("Failed to hand job {} to worker: {}", job_id, e);
                self.status.jobs_dropped(1);
            }
        }
    }

    /// Drop everything pending and release a parked worker.
    fn discard_pending(&mut self) {
        let dropped = self.pending.len();
        if dropped > 0 {
            tracing::warn!("Request queue stopped with {} pending jobs", dropped);
        }
        self.pending.clear();
        self.status.jobs_dropped(dropped);
        // Dropping the parked port wakes an idle worker so it can stop.
        self.waiting_worker = None;
    }
}

/// Queue actor. Its mailbox serializes every enqueue and dequeue, so the
/// FIFO needs no locking of its own.
pub struct QueueActor;

impl Actor for QueueActor {
    type Msg = QueueMessage;
    type State = QueueActorState;
    type Arguments = QueueActorState;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting request queue");
        Ok(args)
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.discard_pending();
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            QueueMessage::Enqueue { job } if state.stopping => {
                tracing::debug!("Dropping job {} enqueued during shutdown", job.id());
                state.status.jobs_dropped(1);
            }

            QueueMessage::Dequeue { reply } if state.stopping => {
                // The worker sees the closed port and stops.
                drop(reply);
            }

            QueueMessage::Enqueue { job } => {
                let job = *job;
                match state.waiting_worker.take() {
                    Some(reply) => state.hand_over(reply, job),
                    None => state.pending.push_back(job),
                }
            }

            QueueMessage::Dequeue { reply } => match state.pending.pop_front() {
                Some(job) => state.hand_over(reply, job),
                None => {
                    if state.waiting_worker.replace(reply).is_some() {
                        tracing::warn!("Replaced a parked dequeue request");
                    }
                }
            },

            QueueMessage::Shutdown if state.stopping => {}

            QueueMessage::Shutdown => {
                tracing::info!("Shutting down request queue");
                state.stopping = true;
                state.discard_pending();
                // Enqueues already in the mailbox are still seen and
                // accounted for before the actor stops.
                if let Err(e) = myself.drain() {
                    tracing::warn!("Failed to drain request queue: {}", e);
                    myself.stop(None);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;

    fn noop(name: &str) -> Job {
        Job::new(name, || async { Ok(()) })
    }

    #[tokio::test]
    async fn job_refused_by_worker_goes_back_to_the_head() {
        let status = StatusTracker::new();
        let mut state = QueueActorState::new(status.clone());
        status.job_enqueued();
        status.job_enqueued();
        state.pending.push_back(noop("second"));

        let (tx, rx) = tokio::sync::oneshot::channel();
        drop(rx);
        state.hand_over(RpcReplyPort::from(tx), noop("first"));

        assert_eq!(state.pending.len(), 2);
        assert_eq!(state.pending.front().map(|j| j.name().as_str()), Some("first"));
        assert_eq!(status.size(), 2);
    }

    #[tokio::test]
    async fn discarding_pending_jobs_settles_the_counters() {
        let status = StatusTracker::new();
        let mut state = QueueActorState::new(status.clone());
        for name in ["a", "b", "c"] {
            status.job_enqueued();
            state.pending.push_back(noop(name));
        }

        state.discard_pending();

        assert!(state.pending.is_empty());
        assert_eq!(status.size(), 0);
        tokio::time::timeout(std::time::Duration::from_secs(1), status.wait_drained())
            .await
            .expect("nothing left unfinished");
    }
}

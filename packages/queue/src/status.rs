//! Read-only status surface over queue depth and the running job.

use std::sync::Arc;
use std::time::Instant;

use bot_core::{ExecutionSnapshot, JobId, JobName, QueueStatus};
use chrono::{DateTime, Utc};
use tokio::sync::watch;

/// The job the worker is running right now.
#[derive(Debug, Clone)]
struct Execution {
    id: JobId,
    name: JobName,
    started_at: DateTime<Utc>,
    started: Instant,
}

#[derive(Debug, Clone, Default)]
struct Counters {
    /// Enqueued but not yet taken by the worker.
    pending: usize,
    /// Enqueued and not yet finished, the running job included.
    unfinished: usize,
    current: Option<Execution>,
}

/// Shared view of the request queue's state.
///
/// Producers bump the pending count on enqueue; every other transition is
/// written by the worker alone. Each transition is a single `send_modify`,
/// so readers never observe a job both pending and running.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    state: Arc<watch::Sender<Counters>>,
}

impl StatusTracker {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(Counters::default());
        Self {
            state: Arc::new(tx),
        }
    }

    /// Number of jobs waiting to run, excluding the running one.
    pub fn size(&self) -> usize {
        self.state.borrow().pending
    }

    /// Name of the running job, or `None` while the worker is idle.
    pub fn current_job_name(&self) -> Option<JobName> {
        self.state.borrow().current.as_ref().map(|c| c.name.clone())
    }

    /// Seconds since the running job started; 0 while idle.
    pub fn elapsed_seconds(&self) -> f64 {
        self.state
            .borrow()
            .current
            .as_ref()
            .map_or(0.0, |c| c.started.elapsed().as_secs_f64())
    }

    /// Whether a job is running right now.
    pub fn is_busy(&self) -> bool {
        self.state.borrow().current.is_some()
    }

    /// Consistent snapshot of depth and the running job.
    pub fn snapshot(&self) -> QueueStatus {
        let state = self.state.borrow();
        QueueStatus {
            pending: state.pending,
            current: state.current.as_ref().map(|c| ExecutionSnapshot {
                id: c.id,
                name: c.name.clone(),
                started_at: c.started_at,
                elapsed_secs: c.started.elapsed().as_secs_f64(),
            }),
        }
    }

    /// Wait until every enqueued job has finished.
    pub async fn wait_drained(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|state| state.unfinished == 0).await;
    }

    /// Record a new pending job and return its position.
    pub(crate) fn job_enqueued(&self) -> usize {
        let mut position = 0;
        self.state.send_modify(|state| {
            state.pending += 1;
            state.unfinished += 1;
            position = state.pending;
        });
        position
    }

    /// Undo `job_enqueued` for a job that never reached the queue.
    pub(crate) fn enqueue_rejected(&self) {
        self.jobs_dropped(1);
    }

    /// Forget jobs that were pending when the queue stopped.
    pub(crate) fn jobs_dropped(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.state.send_modify(|state| {
            state.pending = state.pending.saturating_sub(count);
            state.unfinished = state.unfinished.saturating_sub(count);
        });
    }

    /// Move a job from pending to running.
    pub(crate) fn job_started(&self, id: JobId, name: JobName) {
        self.state.send_modify(|state| {
            state.pending = state.pending.saturating_sub(1);
            state.current = Some(Execution {
                id,
                name,
                started_at: Utc::now(),
                started: Instant::now(),
            });
        });
    }

    /// Clear the running job and mark it done.
    pub(crate) fn job_finished(&self) {
        self.state.send_modify(|state| {
            state.current = None;
            state.unfinished = state.unfinished.saturating_sub(1);
        });
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;

    #[test]
    fn transitions_keep_running_job_out_of_pending() {
        let tracker = StatusTracker::new();
        assert_eq!(tracker.job_enqueued(), 1);
        assert_eq!(tracker.job_enqueued(), 2);

        tracker.job_started(JobId::new(), JobName::new("first"));
        let status = tracker.snapshot();
        assert_eq!(status.pending, 1);
        assert_eq!(status.current_job_name(), Some(&JobName::new("first")));

        tracker.job_finished();
        assert_eq!(tracker.size(), 1);
        assert_eq!(tracker.current_job_name(), None);
        assert_eq!(tracker.elapsed_seconds(), 0.0);
    }

    #[test]
    fn dropped_jobs_never_underflow() {
        let tracker = StatusTracker::new();
        tracker.job_enqueued();
        tracker.jobs_dropped(5);
        assert_eq!(tracker.size(), 0);
        assert!(tracker.snapshot().is_idle());
    }

    #[tokio::test]
    async fn wait_drained_returns_once_last_job_finishes() {
        let tracker = StatusTracker::new();
        tracker.job_enqueued();
        tracker.job_started(JobId::new(), JobName::new("only"));

        let waiter = tracker.clone();
        let drained = tokio::spawn(async move { waiter.wait_drained().await });
        tokio::task::yield_now().await;
        assert!(!drained.is_finished());

        tracker.job_finished();
        tokio::time::timeout(std::time::Duration::from_secs(1), drained)
            .await
            .expect("drained in time")
            .expect("task ran");
    }
}

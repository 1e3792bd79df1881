use std::time::Duration;

use tokio::sync::oneshot;

use request_queue::{Job, JobResult};

/// Poll `check` until it holds or the deadline passes.
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

/// A job that runs until the returned sender fires (or is dropped).
pub fn gated_job(name: &str) -> (Job, oneshot::Sender<JobResult>) {
    let (release, gate) = oneshot::channel::<JobResult>();
    let job = Job::new(name, move || async move { gate.await.unwrap_or(Ok(())) });
    (job, release)
}

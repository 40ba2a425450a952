//! Client side of the status polling contract.
//!
//! Analysis results are never pushed. A client re-reads the task until its
//! `ai_status` leaves `PROCESSING`; reads have no side effects, so polling a
//! settled task any number of times is harmless.

use crate::db::models::Task;
use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    /// The analysis reached a state other than PROCESSING
    Settled(T),
    /// Still processing when the deadline passed; carries the last read
    TimedOut(T),
}

impl<T> PollOutcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            PollOutcome::Settled(t) | PollOutcome::TimedOut(t) => t,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, PollOutcome::Settled(_))
    }
}

/// Anything carrying a task snapshot can be polled
pub trait HasTask {
    fn task(&self) -> &Task;
}

impl HasTask for Task {
    fn task(&self) -> &Task {
        self
    }
}

impl HasTask for crate::db::models::TaskWithThreads {
    fn task(&self) -> &Task {
        &self.task
    }
}

/// Call `fetch` every `interval` until the task is no longer processing or
/// `timeout` elapses. Fetch errors end the wait immediately.
pub async fn wait_for_analysis<T, F, Fut>(
    mut fetch: F,
    interval: Duration,
    timeout: Duration,
) -> Result<PollOutcome<T>>
where
    T: HasTask,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let deadline = Instant::now() + timeout;

    loop {
        let snapshot = fetch().await?;
        if !snapshot.task().ai_status.is_pending() {
            return Ok(PollOutcome::Settled(snapshot));
        }

        let now = Instant::now();
        if now >= deadline {
            tracing::debug!(task_id = snapshot.task().id, "Gave up waiting for analysis");
            return Ok(PollOutcome::TimedOut(snapshot));
        }

        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

use super::{Job, JobQueue};
use crate::error::Result;
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::Instrument;

/// Processes jobs of one name
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    /// Run one delivery of a job. `Err` marks the job failed; it is not
    /// retried by the worker.
    async fn handle(&self, job: &Job) -> Result<()>;

    /// Called once for a job that was failed because it stalled too often
    async fn on_exhausted(&self, _job: &Job) {}
}

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Maximum number of jobs processed in parallel
    pub concurrency: usize,
    /// How often expired leases are looked for
    pub stalled_interval: Duration,
    /// Lease length; renewed every half period while the handler runs
    pub lock_duration: Duration,
    /// Redeliveries allowed after a stall before the job fails
    pub max_stalled_count: i64,
    /// Idle wait between claims when the queue is empty
    pub poll_interval: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            concurrency: 2,
            stalled_interval: Duration::from_secs(10),
            lock_duration: Duration::from_secs(30),
            max_stalled_count: 1,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Consumer registration for one job name
pub struct Worker<H: JobHandler> {
    queue: JobQueue,
    name: String,
    handler: Arc<H>,
    options: WorkerOptions,
}

/// Running worker; dropping it without `shutdown` also stops the loop
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Stop claiming new jobs and wait for in-flight jobs to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "Worker task terminated abnormally");
        }
    }
}

impl<H: JobHandler> Worker<H> {
    pub fn new(
        queue: JobQueue,
        name: impl Into<String>,
        handler: Arc<H>,
        options: WorkerOptions,
    ) -> Self {
        Self {
            queue,
            name: name.into(),
            handler,
            options,
        }
    }

    pub fn spawn(self) -> WorkerHandle {
        let (shutdown, rx) = watch::channel(false);
        let join = tokio::spawn(self.run(rx));
        WorkerHandle { shutdown, join }
    }

    /// Worker loop. Returns once shutdown is requested and every in-flight
    /// job has finished.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let concurrency = self.options.concurrency.max(1);
        let permits = Arc::new(Semaphore::new(concurrency));
        let mut in_flight: JoinSet<()> = JoinSet::new();

        let mut stalled_check = tokio::time::interval(self.options.stalled_interval);
        stalled_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            queue = %self.name,
            concurrency,
            stalled_interval_ms = self.options.stalled_interval.as_millis() as u64,
            "Worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            while let Some(result) = in_flight.try_join_next() {
                log_join_result(result);
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                },
                _ = stalled_check.tick() => self.check_stalled().await,
                permit = permits.clone().acquire_owned() => {
                    let Ok(permit) = permit else { break };

                    match self.queue.claim(&self.name, self.options.lock_duration).await {
                        Ok(Some(job)) => {
                            let queue = self.queue.clone();
                            let handler = Arc::clone(&self.handler);
                            let lock_duration = self.options.lock_duration;
                            in_flight.spawn(async move {
                                let _permit = permit;
                                process_job(queue, handler, job, lock_duration).await;
                            });
                        },
                        Ok(None) => {
                            drop(permit);
                            if self.idle(&mut shutdown).await {
                                break;
                            }
                        },
                        Err(e) => {
                            drop(permit);
                            crate::log_error!(e, "claiming job");
                            if self.idle(&mut shutdown).await {
                                break;
                            }
                        },
                    }
                },
            }
        }

        tracing::info!(queue = %self.name, in_flight = in_flight.len(), "Worker stopping");
        while let Some(result) = in_flight.join_next().await {
            log_join_result(result);
        }
        tracing::info!(queue = %self.name, "Worker stopped");
    }

    /// Wait for new work. Returns true when shutdown was requested.
    async fn idle(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let poll_ms = self.options.poll_interval.as_millis() as u64;
        let jitter_ms = rand::rng().random_range(0..=poll_ms / 4);
        let wait = Duration::from_millis(poll_ms + jitter_ms);

        tokio::select! {
            changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
            _ = self.queue.notified() => false,
            _ = tokio::time::sleep(wait) => false,
        }
    }

    async fn check_stalled(&self) {
        let report = match self
            .queue
            .recover_stalled(&self.name, self.options.max_stalled_count)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                crate::log_error!(e, "recovering stalled jobs");
                return;
            },
        };

        if report.requeued > 0 {
            tracing::warn!(
                queue = %self.name,
                requeued = report.requeued,
                "Stalled jobs handed back for redelivery"
            );
        }

        for job in &report.exhausted {
            tracing::warn!(
                queue = %self.name,
                job_id = job.id,
                stalled_count = job.stalled_count,
                "Job failed after stalling too often"
            );
            self.handler.on_exhausted(job).await;
        }
    }
}

async fn process_job<H: JobHandler>(
    queue: JobQueue,
    handler: Arc<H>,
    job: Job,
    lock_duration: Duration,
) {
    let span = tracing::info_span!("job", job_id = job.id, name = %job.name, attempt = job.attempts);

    async move {
        let started = Instant::now();
        let renew_every = (lock_duration / 2).max(Duration::from_millis(10));
        let mut renew = tokio::time::interval_at(started + renew_every, renew_every);

        let outcome = {
            let work = handler.handle(&job);
            tokio::pin!(work);
            loop {
                tokio::select! {
                    result = &mut work => break result,
                    _ = renew.tick() => {
                        match queue.extend_lock(job.id, lock_duration).await {
                            Ok(true) => {},
                            Ok(false) => tracing::warn!("Lost job lease, it may be redelivered"),
                            Err(e) => tracing::warn!(error = %e, "Failed to extend job lease"),
                        }
                    },
                }
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let recorded = match &outcome {
            Ok(()) => {
                tracing::info!(elapsed_ms, "Job completed");
                queue.complete(job.id).await
            },
            Err(e) => {
                tracing::warn!(error = %e, elapsed_ms, "Job failed");
                queue.fail(job.id, &e.to_string()).await
            },
        };

        match recorded {
            Ok(true) => {},
            Ok(false) => tracing::warn!("Job was no longer active when finishing"),
            Err(e) => {
                crate::log_error!(e, "recording job outcome");
            },
        }
    }
    .instrument(span)
    .await
}

fn log_join_result(result: std::result::Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            tracing::error!("Job handler panicked; the job will be redelivered after its lease expires");
        } else {
            tracing::warn!(error = %e, "Job task cancelled");
        }
    }
}

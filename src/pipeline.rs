//! Wiring of the background side: the analysis worker plus the sweeper that
//! enforces the processing timeout.

use crate::analysis::{expire_stuck_analyses, AnalysisHandler, ANALYZE_JOB};
use crate::config::PipelineConfig;
use crate::llm::LlmProvider;
use crate::queue::{JobQueue, Worker, WorkerHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub struct AnalysisPipeline;

/// Running pipeline; call [`PipelineHandle::shutdown`] to stop it cleanly
pub struct PipelineHandle {
    worker: WorkerHandle,
    sweeper_stop: watch::Sender<bool>,
    sweeper: JoinHandle<()>,
}

impl AnalysisPipeline {
    /// Start consuming analysis jobs from `queue`
    pub fn start(queue: JobQueue, llm: Arc<dyn LlmProvider>, config: &PipelineConfig) -> PipelineHandle {
        let handler = Arc::new(AnalysisHandler::new(queue.pool().clone(), llm));
        let worker = Worker::new(queue.clone(), ANALYZE_JOB, handler, config.worker.clone()).spawn();

        let (sweeper_stop, stop_rx) = watch::channel(false);
        let sweeper = tokio::spawn(sweep_stuck_analyses(
            queue,
            config.worker.stalled_interval,
            config.processing_timeout,
            stop_rx,
        ));

        PipelineHandle {
            worker,
            sweeper_stop,
            sweeper,
        }
    }
}

impl PipelineHandle {
    /// Stop the sweeper, then wait for in-flight analyses to finish
    pub async fn shutdown(self) {
        let _ = self.sweeper_stop.send(true);
        if let Err(e) = self.sweeper.await {
            tracing::error!(error = %e, "Sweeper task terminated abnormally");
        }
        self.worker.shutdown().await;
    }
}

async fn sweep_stuck_analyses(
    queue: JobQueue,
    every: Duration,
    timeout: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            },
            _ = ticker.tick() => {
                if let Err(e) = expire_stuck_analyses(queue.pool(), timeout).await {
                    crate::log_error!(e, "expiring stuck analyses");
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::AiStatus;
    use crate::polling::{wait_for_analysis, PollOutcome};
    use crate::tasks::{NewTask, TaskManager};
    use crate::test_utils::test_helpers::{StubLlm, TestContext};

    fn fast_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.worker.poll_interval = Duration::from_millis(20);
        config.worker.stalled_interval = Duration::from_millis(50);
        config
    }

    #[tokio::test]
    async fn test_created_task_is_analyzed_in_background() {
        let ctx = TestContext::new().await;
        let user_id = ctx.create_user("pipe@example.com").await;
        let queue = JobQueue::new(ctx.pool().clone());
        let handle = AnalysisPipeline::start(
            queue.clone(),
            StubLlm::replying(["1. Go to store"]),
            &fast_config(),
        );

        let tasks = TaskManager::with_queue(&queue);
        let task = tasks
            .add_task(
                user_id,
                &NewTask {
                    title: "Buy milk".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let outcome = wait_for_analysis(
            || tasks.get_task_with_threads(task.id),
            Duration::from_millis(10),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        handle.shutdown().await;

        let PollOutcome::Settled(settled) = outcome else {
            panic!("analysis did not settle");
        };
        assert_eq!(settled.task.ai_status, AiStatus::Completed);
        assert_eq!(settled.threads.len(), 1);
        assert_eq!(settled.threads[0].content, "1. Go to store");
    }

    #[tokio::test]
    async fn test_sweeper_expires_orphaned_processing_task() {
        let ctx = TestContext::new().await;
        let user_id = ctx.create_user("pipe@example.com").await;
        let tasks = TaskManager::new(ctx.pool());
        let task = tasks
            .add_task(
                user_id,
                &NewTask {
                    title: "Orphan".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        // Job vanished, so no worker will ever finish this task
        sqlx::query("DELETE FROM jobs").execute(ctx.pool()).await.unwrap();

        let mut config = fast_config();
        config.processing_timeout = Duration::from_millis(0);
        let handle = AnalysisPipeline::start(
            JobQueue::new(ctx.pool().clone()),
            StubLlm::replying(["unused"]),
            &config,
        );

        let outcome = wait_for_analysis(
            || tasks.get_task(task.id),
            Duration::from_millis(10),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        handle.shutdown().await;

        assert_eq!(outcome.into_inner().ai_status, AiStatus::Error);
    }
}

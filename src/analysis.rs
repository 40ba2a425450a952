//! Background analysis of newly created tasks.
//!
//! One `analyze-task` job per task. The handler drives the task's AI status
//! `PROCESSING -> COMPLETED | ERROR` and stores the generated suggestion as an
//! `AUTO_SUGGESTION` thread.

use crate::db::models::{AiStatus, ThreadRole, ThreadType};
use crate::error::{Result, TaskLensError};
use crate::llm::{ChatMessage, LlmProvider};
use crate::queue::{Job, JobHandler};
use crate::sql_constants::CHECK_TASK_EXISTS;
use crate::tasks::TaskManager;
use crate::threads::ThreadManager;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

/// Queue name for analysis jobs
pub const ANALYZE_JOB: &str = "analyze-task";

pub const ANALYSIS_MAX_TOKENS: u32 = 1024;

const NO_DESCRIPTION: &str = "No description provided.";

/// Payload of an analysis job, captured when the task is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub task_id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub fn build_analysis_prompt(title: &str, description: Option<&str>) -> String {
    let description = description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(NO_DESCRIPTION);

    format!(
        "Analyze the following task and provide actionable steps to complete it. \
         Also list any pre-requisites or things to check before starting.\n\n\
         Task: {}\n\
         Description: {}\n\n\
         Format your response as a clear, structured list.",
        title, description
    )
}

pub struct AnalysisHandler {
    pool: SqlitePool,
    llm: Arc<dyn LlmProvider>,
}

impl AnalysisHandler {
    pub fn new(pool: SqlitePool, llm: Arc<dyn LlmProvider>) -> Self {
        Self { pool, llm }
    }

    /// Run the analysis for one job payload. A task whose AI status is
    /// already terminal is left alone.
    pub async fn analyze(&self, job: &AnalysisJob) -> Result<()> {
        let tasks = TaskManager::new(&self.pool);

        let task = tasks.get_task(job.task_id).await?;
        if task.ai_status.is_terminal() {
            tracing::info!(
                task_id = job.task_id,
                ai_status = %task.ai_status,
                "Skipping analysis of settled task"
            );
            return Ok(());
        }

        tasks.set_ai_status(job.task_id, AiStatus::Processing).await?;

        match self.generate_and_store(job).await {
            Ok(true) => {
                crate::log_task_operation!("analysis_completed", job.task_id);
                Ok(())
            },
            Ok(false) => {
                tracing::warn!(
                    task_id = job.task_id,
                    "Discarding analysis result, task settled while it ran"
                );
                Ok(())
            },
            Err(e) => {
                crate::log_error!(e, "analyzing task");
                if let Err(status_err) = tasks.set_ai_status(job.task_id, AiStatus::Error).await {
                    tracing::warn!(
                        task_id = job.task_id,
                        error = %status_err,
                        "Could not record analysis failure on task"
                    );
                }
                Err(e)
            },
        }
    }

    /// Ask the model, then store the suggestion and move the task to
    /// COMPLETED in one transaction. Returns false when the task left
    /// PROCESSING in the meantime; nothing is written then.
    async fn generate_and_store(&self, job: &AnalysisJob) -> Result<bool> {
        let prompt = build_analysis_prompt(&job.title, job.description.as_deref());
        let suggestion = self
            .llm
            .complete(&[ChatMessage::user(prompt)], ANALYSIS_MAX_TOKENS)
            .await?;

        let mut tx = self.pool.begin().await?;

        let completed = sqlx::query(
            r#"
            UPDATE tasks
            SET ai_status = ?, ai_status_updated_at = ?
            WHERE id = ? AND ai_status = ?
            "#,
        )
        .bind(AiStatus::Completed)
        .bind(Utc::now())
        .bind(job.task_id)
        .bind(AiStatus::Processing)
        .execute(&mut *tx)
        .await?;

        if completed.rows_affected() == 0 {
            let exists: bool = sqlx::query_scalar(CHECK_TASK_EXISTS)
                .bind(job.task_id)
                .fetch_one(&mut *tx)
                .await?;
            tx.rollback().await?;
            if !exists {
                return Err(TaskLensError::TaskNotFound(job.task_id));
            }
            return Ok(false);
        }

        ThreadManager::insert_with(
            &mut *tx,
            job.task_id,
            ThreadType::AutoSuggestion,
            ThreadRole::Assistant,
            &suggestion,
        )
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl JobHandler for AnalysisHandler {
    async fn handle(&self, job: &Job) -> Result<()> {
        let payload: AnalysisJob = job.data()?;
        self.analyze(&payload).await
    }

    async fn on_exhausted(&self, job: &Job) {
        let payload: AnalysisJob = match job.data() {
            Ok(payload) => payload,
            Err(e) => {
                crate::log_error!(e, "decoding exhausted analysis job");
                return;
            },
        };

        match TaskManager::new(&self.pool)
            .set_ai_status(payload.task_id, AiStatus::Error)
            .await
        {
            Ok(()) => tracing::warn!(task_id = payload.task_id, "Analysis abandoned after stalling"),
            Err(TaskLensError::TaskNotFound(_)) => {},
            Err(e) => {
                crate::log_error!(e, "marking stalled analysis failed");
            },
        }
    }
}

/// Error recorded on the jobs of analyses that ran out of time
pub const PROCESSING_TIMEOUT_MESSAGE: &str = "processing timeout";

/// Mark tasks that have been PROCESSING for longer than `timeout` as ERROR
/// and fail their pending jobs in the same transaction, so no late result
/// can flip the task back. Returns how many tasks were changed.
pub async fn expire_stuck_analyses(pool: &SqlitePool, timeout: Duration) -> Result<u64> {
    let now = Utc::now();
    // A timeout reaching past the representable past expires nothing
    let Some(cutoff) = chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|timeout| now.checked_sub_signed(timeout))
    else {
        return Ok(0);
    };

    let mut tx = pool.begin().await?;

    let failed_jobs = sqlx::query(
        r#"
        UPDATE jobs
        SET state = 'FAILED', last_error = ?, locked_until = NULL,
            finished_at = ?, updated_at = ?
        WHERE name = ? AND state IN ('WAITING', 'ACTIVE')
          AND json_extract(payload, '$.task_id') IN (
              SELECT id FROM tasks
              WHERE ai_status = 'PROCESSING' AND ai_status_updated_at < ?
          )
        "#,
    )
    .bind(PROCESSING_TIMEOUT_MESSAGE)
    .bind(now)
    .bind(now)
    .bind(ANALYZE_JOB)
    .bind(cutoff)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let expired = sqlx::query(
        r#"
        UPDATE tasks
        SET ai_status = 'ERROR', ai_status_updated_at = ?
        WHERE ai_status = 'PROCESSING' AND ai_status_updated_at < ?
        "#,
    )
    .bind(now)
    .bind(cutoff)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    tx.commit().await?;

    if expired > 0 {
        tracing::warn!(expired, failed_jobs, "Analyses exceeded the processing timeout");
    }
    Ok(expired)
}

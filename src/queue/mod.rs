//! Durable job queue backed by the `jobs` table.
//!
//! Jobs move `WAITING -> ACTIVE -> COMPLETED | FAILED`. A claimed job holds a
//! lease (`locked_until`, epoch milliseconds) that its worker renews while the
//! handler runs. A job whose lease expires is considered stalled and is handed
//! back to `WAITING` until it has stalled `max_stalled_count` times, after
//! which it fails. Delivery is therefore at-least-once.

pub mod worker;

pub use worker::{JobHandler, Worker, WorkerHandle, WorkerOptions};

use crate::error::{Result, TaskLensError};
use crate::sql_constants::{JOB_COLUMNS, SELECT_JOB_BY_ID};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Sqlite, SqlitePool};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub const STALLED_LIMIT_MESSAGE: &str = "job stalled more than allowable limit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Job {
    pub id: i64,
    pub name: String,
    pub payload: String,
    pub state: JobState,
    pub attempts: i64,
    pub stalled_count: i64,
    pub locked_until: Option<i64>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Decode the JSON payload
    pub fn data<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub waiting: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}

/// Outcome of one stalled-job sweep
#[derive(Debug, Default)]
pub struct StalledReport {
    /// Jobs handed back to WAITING for redelivery
    pub requeued: u64,
    /// Jobs failed because they stalled too often
    pub exhausted: Vec<Job>,
}

#[derive(Clone)]
pub struct JobQueue {
    pool: SqlitePool,
    wake: Arc<Notify>,
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Lease deadline in epoch milliseconds, saturating for absurd durations
fn lease_until(lock_duration: Duration) -> i64 {
    let lock_ms = i64::try_from(lock_duration.as_millis()).unwrap_or(i64::MAX);
    now_millis().saturating_add(lock_ms)
}

impl JobQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Append a job and return its id once the row is committed
    pub async fn enqueue<T: Serialize>(&self, name: &str, payload: &T) -> Result<i64> {
        let id = Self::enqueue_with(&self.pool, name, payload).await?;
        self.wake();
        Ok(id)
    }

    /// Append a job through an existing executor, typically an open
    /// transaction, so the job commits together with the caller's writes.
    /// Call [`JobQueue::wake`] after the commit.
    pub async fn enqueue_with<'e, E, T>(executor: E, name: &str, payload: &T) -> Result<i64>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
        T: Serialize,
    {
        if name.trim().is_empty() {
            return Err(TaskLensError::InvalidInput(
                "Job name cannot be empty".to_string(),
            ));
        }

        let payload = serde_json::to_string(payload)?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO jobs (name, payload, state, created_at, updated_at)
            VALUES (?, ?, 'WAITING', ?, ?)
            "#,
        )
        .bind(name)
        .bind(payload)
        .bind(now)
        .bind(now)
        .execute(executor)
        .await?;

        let id = result.last_insert_rowid();
        crate::log_job_operation!("enqueued", id, name);
        Ok(id)
    }

    /// Wake an idle in-process worker
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    pub(crate) async fn notified(&self) {
        self.wake.notified().await
    }

    /// Atomically take the oldest waiting job with this name
    pub async fn claim(&self, name: &str, lock_duration: Duration) -> Result<Option<Job>> {
        let sql = format!(
            r#"
            UPDATE jobs
            SET state = 'ACTIVE', attempts = attempts + 1, locked_until = ?, updated_at = ?
            WHERE id = (
                SELECT id FROM jobs
                WHERE name = ? AND state = 'WAITING'
                ORDER BY id ASC
                LIMIT 1
            )
            RETURNING {}
            "#,
            JOB_COLUMNS
        );

        let job = sqlx::query_as::<_, Job>(&sql)
            .bind(lease_until(lock_duration))
            .bind(Utc::now())
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(job)
    }

    /// Renew the lease of an active job. Returns false when the job is no
    /// longer active (for example it was already recovered as stalled).
    pub async fn extend_lock(&self, id: i64, lock_duration: Duration) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET locked_until = ?, updated_at = ? WHERE id = ? AND state = 'ACTIVE'",
        )
        .bind(lease_until(lock_duration))
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark an active job completed. Returns false if the job was not active.
    pub async fn complete(&self, id: i64) -> Result<bool> {
        self.finish(id, JobState::Completed, None).await
    }

    /// Mark an active job failed. Failed jobs are not retried.
    pub async fn fail(&self, id: i64, error: &str) -> Result<bool> {
        self.finish(id, JobState::Failed, Some(error)).await
    }

    async fn finish(&self, id: i64, state: JobState, error: Option<&str>) -> Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?, last_error = COALESCE(?, last_error), locked_until = NULL,
                finished_at = ?, updated_at = ?
            WHERE id = ? AND state = 'ACTIVE'
            "#,
        )
        .bind(state)
        .bind(error)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Hand jobs with an expired lease back to the queue, or fail them once
    /// they have stalled `max_stalled_count` times.
    pub async fn recover_stalled(&self, name: &str, max_stalled_count: i64) -> Result<StalledReport> {
        let now = Utc::now();
        let now_ms = now_millis();
        let mut tx = self.pool.begin().await?;

        let exhaust_sql = format!(
            r#"
            UPDATE jobs
            SET state = 'FAILED', stalled_count = stalled_count + 1, last_error = ?,
                locked_until = NULL, finished_at = ?, updated_at = ?
            WHERE name = ? AND state = 'ACTIVE' AND locked_until < ? AND stalled_count >= ?
            RETURNING {}
            "#,
            JOB_COLUMNS
        );

        let exhausted = sqlx::query_as::<_, Job>(&exhaust_sql)
            .bind(STALLED_LIMIT_MESSAGE)
            .bind(now)
            .bind(now)
            .bind(name)
            .bind(now_ms)
            .bind(max_stalled_count)
            .fetch_all(&mut *tx)
            .await?;

        let requeued = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'WAITING', stalled_count = stalled_count + 1,
                locked_until = NULL, updated_at = ?
            WHERE name = ? AND state = 'ACTIVE' AND locked_until < ?
            "#,
        )
        .bind(now)
        .bind(name)
        .bind(now_ms)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        if requeued > 0 {
            self.wake();
        }

        Ok(StalledReport {
            requeued,
            exhausted,
        })
    }

    pub async fn get(&self, id: i64) -> Result<Job> {
        sqlx::query_as::<_, Job>(SELECT_JOB_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(TaskLensError::JobNotFound(id))
    }

    /// Jobs with this name, oldest first, optionally filtered by state
    pub async fn list(&self, name: &str, state: Option<JobState>) -> Result<Vec<Job>> {
        let mut builder: sqlx::QueryBuilder<Sqlite> =
            sqlx::QueryBuilder::new(format!("SELECT {} FROM jobs WHERE name = ", JOB_COLUMNS));
        builder.push_bind(name);
        if let Some(state) = state {
            builder.push(" AND state = ").push_bind(state);
        }
        builder.push(" ORDER BY id ASC");

        let jobs = builder.build_query_as::<Job>().fetch_all(&self.pool).await?;
        Ok(jobs)
    }

    pub async fn counts(&self, name: &str) -> Result<JobCounts> {
        let rows: Vec<(JobState, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM jobs WHERE name = ? GROUP BY state")
                .bind(name)
                .fetch_all(&self.pool)
                .await?;

        let mut counts = JobCounts::default();
        for (state, count) in rows {
            match state {
                JobState::Waiting => counts.waiting = count,
                JobState::Active => counts.active = count,
                JobState::Completed => counts.completed = count,
                JobState::Failed => counts.failed = count,
            }
        }
        Ok(counts)
    }
}

use crate::analysis::{AnalysisJob, ANALYZE_JOB};
use crate::db::models::{AiStatus, AiThread, Priority, Task, TaskStatus, TaskWithThreads};
use crate::error::{Result, TaskLensError};
use crate::queue::JobQueue;
use crate::sql_constants::{
    CHECK_TASK_EXISTS, SELECT_TASK_BY_ID, SELECT_TASK_BY_ID_FOR_OWNER, SELECT_TASK_FULL,
    THREAD_COLUMNS,
};
use crate::threads::ThreadManager;
use crate::users::UserManager;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;
use std::collections::HashMap;

/// Fields accepted when creating a task
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

/// User-editable fields. `ai_status` is not one of them.
///
/// For the nullable columns the outer `Option` means "leave unchanged" and
/// `Some(None)` clears the value.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub due_date: Option<Option<DateTime<Utc>>>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
}

pub struct TaskManager<'a> {
    pool: &'a SqlitePool,
    queue: Option<&'a JobQueue>,
}

fn normalize_description(description: Option<&str>) -> Option<String> {
    description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

fn validate_title(title: &str) -> Result<&str> {
    let title = title.trim();
    if title.is_empty() {
        return Err(TaskLensError::InvalidInput(
            "Task title cannot be empty".to_string(),
        ));
    }
    Ok(title)
}

impl<'a> TaskManager<'a> {
    /// Manager without an in-process queue. Analysis jobs are still written,
    /// a worker in another process picks them up on its next poll.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool, queue: None }
    }

    /// Manager that also wakes in-process workers after enqueueing
    pub fn with_queue(queue: &'a JobQueue) -> Self {
        Self {
            pool: queue.pool(),
            queue: Some(queue),
        }
    }

    /// Create a task and schedule its analysis.
    ///
    /// The task row (with `ai_status = PROCESSING`) and the analysis job are
    /// committed in one transaction: either both exist or neither does.
    pub async fn add_task(&self, user_id: i64, new_task: &NewTask) -> Result<Task> {
        let title = validate_title(&new_task.title)?;
        let description = normalize_description(new_task.description.as_deref());

        UserManager::new(self.pool).check_user_exists(user_id).await?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO tasks (user_id, title, description, status, priority, ai_status,
                               ai_status_updated_at, due_date, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(&description)
        .bind(TaskStatus::Pending)
        .bind(new_task.priority)
        .bind(AiStatus::Processing)
        .bind(now)
        .bind(new_task.due_date)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let id = result.last_insert_rowid();
        let job = AnalysisJob {
            task_id: id,
            title: title.to_string(),
            description,
        };
        JobQueue::enqueue_with(&mut *tx, ANALYZE_JOB, &job).await?;

        tx.commit().await?;

        if let Some(queue) = self.queue {
            queue.wake();
        }

        crate::log_task_operation!("created", id);
        self.get_task(id).await
    }

    /// Get a task by ID
    pub async fn get_task(&self, id: i64) -> Result<Task> {
        let task = sqlx::query_as::<_, Task>(SELECT_TASK_BY_ID)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(TaskLensError::TaskNotFound(id))?;

        Ok(task)
    }

    /// Get a task only if it belongs to `user_id`. Someone else's task is
    /// reported as not found.
    pub async fn get_task_for_owner(&self, id: i64, user_id: i64) -> Result<Task> {
        let task = sqlx::query_as::<_, Task>(SELECT_TASK_BY_ID_FOR_OWNER)
            .bind(id)
            .bind(user_id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(TaskLensError::TaskNotFound(id))?;

        Ok(task)
    }

    pub async fn get_task_with_threads(&self, id: i64) -> Result<TaskWithThreads> {
        let task = self.get_task(id).await?;
        let threads = ThreadManager::new(self.pool).list_threads(id).await?;

        Ok(TaskWithThreads { task, threads })
    }

    /// The owner's tasks, newest first, each with its threads
    pub async fn find_tasks(
        &self,
        user_id: i64,
        filter: &TaskFilter,
    ) -> Result<Vec<TaskWithThreads>> {
        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new(format!("{} WHERE user_id = ", SELECT_TASK_FULL));
        builder.push_bind(user_id);

        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(priority) = filter.priority {
            builder.push(" AND priority = ").push_bind(priority);
        }
        builder.push(" ORDER BY created_at DESC, id DESC");

        let tasks = builder.build_query_as::<Task>().fetch_all(self.pool).await?;
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        // One query for all threads instead of one per task
        let mut thread_query: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new(
            format!("SELECT {} FROM ai_threads WHERE task_id IN (", THREAD_COLUMNS),
        );
        let mut ids = thread_query.separated(", ");
        for task in &tasks {
            ids.push_bind(task.id);
        }
        thread_query.push(") ORDER BY created_at ASC, id ASC");

        let threads = thread_query
            .build_query_as::<AiThread>()
            .fetch_all(self.pool)
            .await?;

        let mut by_task: HashMap<i64, Vec<AiThread>> = HashMap::new();
        for thread in threads {
            by_task.entry(thread.task_id).or_default().push(thread);
        }

        Ok(tasks
            .into_iter()
            .map(|task| {
                let threads = by_task.remove(&task.id).unwrap_or_default();
                TaskWithThreads { task, threads }
            })
            .collect())
    }

    /// Apply a user edit. Never touches `ai_status`.
    pub async fn update_task(&self, id: i64, update: &TaskUpdate) -> Result<Task> {
        let task = self.get_task(id).await?;

        if update.is_empty() {
            return Ok(task);
        }

        // Build dynamic update query using QueryBuilder for SQL injection safety
        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("UPDATE tasks SET ");
        let mut fields = builder.separated(", ");

        if let Some(title) = &update.title {
            fields.push("title = ").push_bind_unseparated(validate_title(title)?.to_string());
        }

        if let Some(description) = &update.description {
            fields
                .push("description = ")
                .push_bind_unseparated(normalize_description(description.as_deref()));
        }

        if let Some(status) = update.status {
            fields.push("status = ").push_bind_unseparated(status);
        }

        if let Some(priority) = update.priority {
            fields.push("priority = ").push_bind_unseparated(priority);
        }

        if let Some(due_date) = update.due_date {
            fields.push("due_date = ").push_bind_unseparated(due_date);
        }

        builder.push(" WHERE id = ").push_bind(id);
        builder.build().execute(self.pool).await?;

        crate::log_task_operation!("updated", id);
        self.get_task(id).await
    }

    /// Record an AI status transition
    pub async fn set_ai_status(&self, id: i64, status: AiStatus) -> Result<()> {
        let result = sqlx::query(
            "UPDATE tasks SET ai_status = ?, ai_status_updated_at = ? WHERE id = ?",
        )
        .bind(status)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TaskLensError::TaskNotFound(id));
        }

        tracing::debug!(task_id = id, ai_status = %status, "AI status changed");
        Ok(())
    }

    /// Delete a task; its threads go with it
    pub async fn delete_task(&self, id: i64) -> Result<()> {
        self.check_task_exists(id).await?;

        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        crate::log_task_operation!("deleted", id);
        Ok(())
    }

    async fn check_task_exists(&self, id: i64) -> Result<()> {
        let exists: bool = sqlx::query_scalar(CHECK_TASK_EXISTS)
            .bind(id)
            .fetch_one(self.pool)
            .await?;

        if !exists {
            return Err(TaskLensError::TaskNotFound(id));
        }
        Ok(())
    }
}

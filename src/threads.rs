use crate::db::models::{AiThread, ThreadRole, ThreadType};
use crate::error::{Result, TaskLensError};
use crate::sql_constants::{CHECK_TASK_EXISTS, SELECT_THREADS_FOR_TASK, SELECT_THREAD_BY_ID};
use chrono::Utc;
use sqlx::{Executor, Sqlite, SqlitePool};

/// Append-only access to a task's AI conversation
pub struct ThreadManager<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ThreadManager<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_thread(
        &self,
        task_id: i64,
        thread_type: ThreadType,
        role: ThreadRole,
        content: &str,
    ) -> Result<AiThread> {
        let exists: bool = sqlx::query_scalar(CHECK_TASK_EXISTS)
            .bind(task_id)
            .fetch_one(self.pool)
            .await?;
        if !exists {
            return Err(TaskLensError::TaskNotFound(task_id));
        }

        let id = Self::insert_with(self.pool, task_id, thread_type, role, content).await?;

        let thread = sqlx::query_as::<_, AiThread>(SELECT_THREAD_BY_ID)
            .bind(id)
            .fetch_one(self.pool)
            .await?;

        tracing::debug!(
            task_id,
            thread_id = thread.id,
            thread_type = %thread_type,
            "Thread appended"
        );
        Ok(thread)
    }

    /// Append an entry on any executor, so it can share a transaction with
    /// other writes. The caller is responsible for the task existing.
    pub(crate) async fn insert_with<'e, E>(
        executor: E,
        task_id: i64,
        thread_type: ThreadType,
        role: ThreadRole,
        content: &str,
    ) -> Result<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            INSERT INTO ai_threads (task_id, type, role, content, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(task_id)
        .bind(thread_type)
        .bind(role)
        .bind(content)
        .bind(Utc::now())
        .execute(executor)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// All entries of a task, oldest first
    pub async fn list_threads(&self, task_id: i64) -> Result<Vec<AiThread>> {
        let threads = sqlx::query_as::<_, AiThread>(SELECT_THREADS_FOR_TASK)
            .bind(task_id)
            .fetch_all(self.pool)
            .await?;

        Ok(threads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_helpers::TestContext;
    use chrono::Duration;

    async fn insert_task(ctx: &TestContext) -> i64 {
        let user_id = ctx.create_user("threads@example.com").await;
        sqlx::query("INSERT INTO tasks (user_id, title) VALUES (?, 'Task')")
            .bind(user_id)
            .execute(ctx.pool())
            .await
            .unwrap()
            .last_insert_rowid()
    }

    #[tokio::test]
    async fn test_create_thread() {
        let ctx = TestContext::new().await;
        let task_id = insert_task(&ctx).await;
        let manager = ThreadManager::new(ctx.pool());

        let thread = manager
            .create_thread(task_id, ThreadType::UserQuestion, ThreadRole::User, "Why?")
            .await
            .unwrap();

        assert_eq!(thread.task_id, task_id);
        assert_eq!(thread.thread_type, ThreadType::UserQuestion);
        assert_eq!(thread.role, ThreadRole::User);
        assert_eq!(thread.content, "Why?");
    }

    #[tokio::test]
    async fn test_create_thread_for_missing_task() {
        let ctx = TestContext::new().await;
        let manager = ThreadManager::new(ctx.pool());

        let result = manager
            .create_thread(99, ThreadType::AiAnswer, ThreadRole::Assistant, "x")
            .await;
        assert!(matches!(result, Err(TaskLensError::TaskNotFound(99))));
    }

    #[tokio::test]
    async fn test_list_threads_orders_by_created_at_not_id() {
        let ctx = TestContext::new().await;
        let task_id = insert_task(&ctx).await;
        let now = Utc::now();

        // Insert the newer entry first so id order and time order disagree
        for (content, at) in [("second", now), ("first", now - Duration::seconds(5))] {
            sqlx::query(
                "INSERT INTO ai_threads (task_id, type, role, content, created_at) VALUES (?, 'AI_ANSWER', 'ASSISTANT', ?, ?)",
            )
            .bind(task_id)
            .bind(content)
            .bind(at)
            .execute(ctx.pool())
            .await
            .unwrap();
        }

        let threads = ThreadManager::new(ctx.pool())
            .list_threads(task_id)
            .await
            .unwrap();
        let contents: Vec<&str> = threads.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_list_threads_empty() {
        let ctx = TestContext::new().await;
        let task_id = insert_task(&ctx).await;

        let threads = ThreadManager::new(ctx.pool())
            .list_threads(task_id)
            .await
            .unwrap();
        assert!(threads.is_empty());
    }
}

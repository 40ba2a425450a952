//! Shared setup for the integration tests: a throwaway database and a
//! scripted LLM provider.

#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tasklens::db::models::{AiStatus, TaskWithThreads};
use tasklens::db::{create_pool, run_migrations};
use tasklens::error::{Result, TaskLensError};
use tasklens::llm::{ChatMessage, LlmProvider};
use tasklens::polling::wait_for_analysis;
use tasklens::queue::WorkerOptions;
use tasklens::tasks::TaskManager;
use tasklens::users::UserManager;
use tempfile::TempDir;

pub struct TestDb {
    pub pool: SqlitePool,
    pub user_id: i64,
    _dir: TempDir,
}

impl TestDb {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let pool = create_pool(&dir.path().join("tasklens.db")).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let user = UserManager::new(&pool)
            .add_user("owner@example.com", Some("Owner"))
            .await
            .unwrap();

        Self {
            pool,
            user_id: user.id,
            _dir: dir,
        }
    }

    pub async fn add_user(&self, email: &str) -> i64 {
        UserManager::new(&self.pool)
            .add_user(email, None)
            .await
            .unwrap()
            .id
    }

    /// Poll until the task's analysis settles; panics if it never does
    pub async fn settled(&self, task_id: i64) -> TaskWithThreads {
        let tasks = TaskManager::new(&self.pool);
        let outcome = wait_for_analysis(
            || tasks.get_task_with_threads(task_id),
            Duration::from_millis(10),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert!(outcome.is_settled(), "analysis of task {} never settled", task_id);
        let item = outcome.into_inner();
        assert_ne!(item.task.ai_status, AiStatus::Processing);
        item
    }
}

/// Worker settings tuned so tests do not wait on production intervals
pub fn fast_worker() -> WorkerOptions {
    WorkerOptions {
        concurrency: 2,
        stalled_interval: Duration::from_millis(50),
        lock_duration: Duration::from_millis(500),
        max_stalled_count: 1,
        poll_interval: Duration::from_millis(10),
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

/// LLM that answers from a script and records what it was asked
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<std::result::Result<&str, &str>>) -> Arc<Self> {
        let replies = replies
            .into_iter()
            .map(|r| r.map(str::to_string).map_err(str::to_string))
            .collect();
        Arc::new(Self {
            replies: Mutex::new(replies),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn complete(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<String> {
        self.calls.lock().unwrap().push(Call {
            messages: messages.to_vec(),
            max_tokens,
        });

        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(TaskLensError::ProviderError(message)),
            None => Err(TaskLensError::ProviderError("script exhausted".to_string())),
        }
    }
}

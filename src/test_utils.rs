#[cfg(test)]
pub mod test_helpers {
    use crate::db::{create_pool, run_migrations};
    use crate::error::{Result, TaskLensError};
    use crate::llm::{ChatMessage, LlmProvider};
    use async_trait::async_trait;
    use sqlx::SqlitePool;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    pub struct TestContext {
        pub pool: SqlitePool,
        pub _temp_dir: TempDir,
    }

    impl TestContext {
        pub async fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let db_path = temp_dir.path().join("tasklens.db");

            let pool = create_pool(&db_path).await.unwrap();
            run_migrations(&pool).await.unwrap();

            Self {
                pool,
                _temp_dir: temp_dir,
            }
        }

        pub fn pool(&self) -> &SqlitePool {
            &self.pool
        }

        /// Insert a user (or return the existing one) and return its id
        pub async fn create_user(&self, email: &str) -> i64 {
            sqlx::query_scalar(
                "INSERT INTO users (email) VALUES (?) ON CONFLICT(email) DO UPDATE SET email = excluded.email RETURNING id",
            )
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .unwrap()
        }
    }

    /// One recorded call to the stub
    #[derive(Debug, Clone)]
    pub struct RecordedCall {
        pub messages: Vec<ChatMessage>,
        pub max_tokens: u32,
    }

    /// Scripted LLM: answers from a queue of replies and records every call
    pub struct StubLlm {
        replies: Mutex<VecDeque<std::result::Result<String, String>>>,
        calls: Mutex<Vec<RecordedCall>>,
        /// Error returned once the script runs out
        exhausted: String,
    }

    impl StubLlm {
        pub fn scripted(
            replies: impl IntoIterator<Item = std::result::Result<String, String>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().collect()),
                calls: Mutex::new(Vec::new()),
                exhausted: "no scripted reply left".to_string(),
            })
        }

        pub fn replying<I, S>(replies: I) -> Arc<Self>
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self::scripted(replies.into_iter().map(|r| Ok(r.into())))
        }

        /// Every call fails with `message`
        pub fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(VecDeque::new()),
                calls: Mutex::new(Vec::new()),
                exhausted: message.to_string(),
            })
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmProvider for StubLlm {
        async fn complete(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<String> {
            self.calls.lock().unwrap().push(RecordedCall {
                messages: messages.to_vec(),
                max_tokens,
            });

            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(text),
                Some(Err(message)) => Err(TaskLensError::ProviderError(message)),
                None => Err(TaskLensError::ProviderError(self.exhausted.clone())),
            }
        }
    }
}

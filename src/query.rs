//! Follow-up questions about a task, answered synchronously.

use crate::db::models::{AiThread, Task, ThreadRole, ThreadType};
use crate::error::{Result, TaskLensError};
use crate::llm::{ChatMessage, LlmProvider};
use crate::tasks::TaskManager;
use crate::threads::ThreadManager;
use sqlx::SqlitePool;
use std::sync::Arc;

pub const QUERY_MAX_TOKENS: u32 = 500;

/// Stored as the answer when the model returns nothing
pub const FALLBACK_ANSWER: &str = "Sorry, I could not generate a response.";

/// How much of the earlier conversation is replayed to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryPolicy {
    /// Only the task context and the new question
    #[default]
    CurrentQuestionOnly,
    /// Up to `n` of the most recent earlier thread entries, oldest first
    Recent(usize),
}

impl HistoryPolicy {
    /// `0` means no history
    pub fn from_limit(limit: usize) -> Self {
        if limit == 0 {
            HistoryPolicy::CurrentQuestionOnly
        } else {
            HistoryPolicy::Recent(limit)
        }
    }
}

fn system_prompt(task: &Task) -> String {
    format!(
        "You are a helpful assistant for a task manager app. The user is asking about the task: \"{}\". Task description: \"{}\". Answer concisely and helpfully.",
        task.title,
        task.description.as_deref().unwrap_or("")
    )
}

/// Assemble the messages sent to the model. `history` excludes the question
/// being asked and is in chronological order.
pub fn build_conversation(
    task: &Task,
    history: &[AiThread],
    question: &str,
    policy: HistoryPolicy,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(system_prompt(task))];

    if let HistoryPolicy::Recent(n) = policy {
        let skip = history.len().saturating_sub(n);
        messages.extend(
            history[skip..]
                .iter()
                .map(|thread| ChatMessage::new(thread.role, thread.content.clone())),
        );
    }

    messages.push(ChatMessage::user(question));
    messages
}

pub struct QueryHandler {
    pool: SqlitePool,
    llm: Arc<dyn LlmProvider>,
    history: HistoryPolicy,
}

impl QueryHandler {
    pub fn new(pool: SqlitePool, llm: Arc<dyn LlmProvider>, history: HistoryPolicy) -> Self {
        Self { pool, llm, history }
    }

    /// Ask a question about a task and return the stored answer.
    ///
    /// The question is stored before the model is called and stays stored
    /// when the call fails.
    pub async fn submit_query(&self, task_id: i64, question: &str) -> Result<AiThread> {
        let question = question.trim();
        if question.is_empty() {
            return Err(TaskLensError::InvalidInput(
                "Question cannot be empty".to_string(),
            ));
        }

        let task = TaskManager::new(&self.pool).get_task(task_id).await?;
        let threads = ThreadManager::new(&self.pool);

        let history = match self.history {
            HistoryPolicy::CurrentQuestionOnly => Vec::new(),
            HistoryPolicy::Recent(_) => threads.list_threads(task_id).await?,
        };

        threads
            .create_thread(task_id, ThreadType::UserQuestion, ThreadRole::User, question)
            .await?;

        let messages = build_conversation(&task, &history, question, self.history);
        let answer = self.llm.complete(&messages, QUERY_MAX_TOKENS).await?;

        let content = if answer.trim().is_empty() {
            FALLBACK_ANSWER
        } else {
            answer.as_str()
        };

        let thread = threads
            .create_thread(task_id, ThreadType::AiAnswer, ThreadRole::Assistant, content)
            .await?;

        crate::log_task_operation!("query_answered", task_id);
        Ok(thread)
    }
}

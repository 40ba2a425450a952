use crate::config::lookup;
use crate::db::models::ThreadRole;
use crate::error::{Result, TaskLensError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A chat message for the OpenAI-compatible API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ThreadRole, content: impl Into<String>) -> Self {
        Self {
            role: role_name(role).to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ThreadRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ThreadRole::User, content)
    }
}

fn role_name(role: ThreadRole) -> &'static str {
    match role {
        ThreadRole::User => "user",
        ThreadRole::Assistant => "assistant",
        ThreadRole::System => "system",
    }
}

/// Text-completion capability used by the analysis worker and the query
/// handler. The provider behind it is configuration.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<String>;
}

/// LLM configuration resolved from env vars and the settings table
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
}

impl LlmConfig {
    /// Returns Some only when endpoint, api_key and model are all configured.
    pub async fn resolve(pool: &SqlitePool) -> Result<Option<Self>> {
        let endpoint = lookup(pool, "llm.endpoint").await?;
        let api_key = lookup(pool, "llm.api_key").await?;
        let model = lookup(pool, "llm.model").await?;

        match (endpoint, api_key, model) {
            (Some(endpoint), Some(api_key), Some(model)) => Ok(Some(Self {
                endpoint,
                api_key,
                model,
            })),
            _ => Ok(None),
        }
    }
}

/// OpenAI-compatible chat completion request
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
}

/// OpenAI-compatible chat completion response
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible LLM client
pub struct LlmClient {
    config: LlmConfig,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TaskLensError::OtherError(e.into()))?;

        Ok(Self { config, client })
    }

    /// Create a client from the resolved configuration.
    /// Returns an error if the LLM is not fully configured.
    pub async fn from_pool(pool: &SqlitePool) -> Result<Self> {
        let config = LlmConfig::resolve(pool).await?.ok_or_else(|| {
            TaskLensError::InvalidInput(
                "LLM not configured. Set llm.endpoint, llm.api_key, and llm.model via 'tasklens config set' or environment variables (TASKLENS_LLM_ENDPOINT, TASKLENS_LLM_API_KEY, TASKLENS_LLM_MODEL).".to_string(),
            )
        })?;

        Self::new(config)
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl LlmProvider for LlmClient {
    async fn complete(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| TaskLensError::ProviderError(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "(no body)".to_string());
            return Err(TaskLensError::ProviderError(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| TaskLensError::ProviderError(format!("malformed response: {}", e)))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| TaskLensError::ProviderError("LLM returned empty choices".to_string()))
    }
}

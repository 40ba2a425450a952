use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskLensError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(i64),

    #[error("User not found: {0}")]
    UserNotFound(i64),

    #[error("Job not found: {0}")]
    JobNotFound(i64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("LLM provider error: {0}")]
    ProviderError(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    OtherError(#[from] anyhow::Error),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl TaskLensError {
    pub fn to_error_code(&self) -> &'static str {
        match self {
            TaskLensError::TaskNotFound(_) => "TASK_NOT_FOUND",
            TaskLensError::UserNotFound(_) => "USER_NOT_FOUND",
            TaskLensError::JobNotFound(_) => "JOB_NOT_FOUND",
            TaskLensError::DatabaseError(_) => "DATABASE_ERROR",
            TaskLensError::InvalidInput(_) => "INVALID_INPUT",
            TaskLensError::ProviderError(_) => "PROVIDER_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }

    /// True for errors the caller caused and should not retry unchanged.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TaskLensError::TaskNotFound(_)
                | TaskLensError::UserNotFound(_)
                | TaskLensError::JobNotFound(_)
                | TaskLensError::InvalidInput(_)
        )
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            code: self.to_error_code().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TaskLensError>;

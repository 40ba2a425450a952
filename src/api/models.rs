use crate::db::models::{Priority, TaskStatus};
use crate::error::TaskLensError;
use crate::tasks::{NewTask, TaskFilter, TaskUpdate};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }
}

fn status_for(error: &TaskLensError) -> StatusCode {
    match error {
        TaskLensError::TaskNotFound(_)
        | TaskLensError::UserNotFound(_)
        | TaskLensError::JobNotFound(_) => StatusCode::NOT_FOUND,
        TaskLensError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        TaskLensError::ProviderError(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for TaskLensError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            crate::log_error!(self, "handling request");
        }

        (
            status,
            Json(ApiError::new(self.to_error_code(), self.to_string())),
        )
            .into_response()
    }
}

/// Present-but-null becomes `Some(None)`, absent stays `None` via `default`
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Create task request. A missing title reads as blank and is rejected by
/// the same check as an empty one.
#[derive(Deserialize)]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

impl From<CreateTaskRequest> for NewTask {
    fn from(req: CreateTaskRequest) -> Self {
        NewTask {
            title: req.title,
            description: req.description,
            priority: req.priority.unwrap_or_default(),
            due_date: req.due_date,
        }
    }
}

/// Update task request. There is no `ai_status` field; the AI status is
/// owned by the pipeline and extra fields are ignored.
#[derive(Deserialize)]
pub struct UpdateTaskRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<DateTime<Utc>>>,
}

impl From<UpdateTaskRequest> for TaskUpdate {
    fn from(req: UpdateTaskRequest) -> Self {
        TaskUpdate {
            title: req.title,
            description: req.description,
            status: req.status,
            priority: req.priority,
            due_date: req.due_date,
        }
    }
}

/// Query parameters for task list
#[derive(Deserialize)]
pub struct TaskListQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
}

impl TaskListQuery {
    pub fn to_filter(&self) -> Result<TaskFilter, TaskLensError> {
        Ok(TaskFilter {
            status: self.status.as_deref().map(str::parse).transpose()?,
            priority: self.priority.as_deref().map(str::parse).transpose()?,
        })
    }
}

#[derive(Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub question: String,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_request_distinguishes_null_from_absent() {
        let req: UpdateTaskRequest =
            serde_json::from_str(r#"{"description": null, "status": "COMPLETED"}"#).unwrap();
        assert_eq!(req.description, Some(None));
        assert_eq!(req.due_date, None);
        assert_eq!(req.status, Some(TaskStatus::Completed));
    }

    #[test]
    fn test_update_request_ignores_ai_status() {
        let req: UpdateTaskRequest =
            serde_json::from_str(r#"{"ai_status": "COMPLETED"}"#).unwrap();
        assert!(TaskUpdate::from(req).is_empty());
    }

    #[test]
    fn test_list_query_parses_filters() {
        let query = TaskListQuery {
            status: Some("in_progress".to_string()),
            priority: None,
        };
        let filter = query.to_filter().unwrap();
        assert_eq!(filter.status, Some(TaskStatus::InProgress));

        let bad = TaskListQuery {
            status: None,
            priority: Some("urgent".to_string()),
        };
        assert!(bad.to_filter().is_err());
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(status_for(&TaskLensError::TaskNotFound(1)), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&TaskLensError::InvalidInput("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&TaskLensError::ProviderError("x".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&TaskLensError::OtherError(anyhow::anyhow!("x"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

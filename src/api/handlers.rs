use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;

use super::models::*;
use super::server::AppState;
use crate::error::{Result, TaskLensError};
use crate::query::QueryHandler;
use crate::tasks::TaskManager;
use crate::threads::ThreadManager;
use crate::users::UserManager;

/// Header carrying the authenticated user's id
pub const USER_HEADER: &str = "x-user-id";

/// The user on whose behalf the request runs. Authentication happens in
/// front of this service; here the id only has to name an existing user.
#[derive(Debug, Clone, Copy)]
pub struct Owner(pub i64);

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiError::new("UNAUTHORIZED", message)),
    )
        .into_response()
}

#[async_trait]
impl FromRequestParts<AppState> for Owner {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let Some(raw) = parts.headers.get(USER_HEADER) else {
            return Err(unauthorized("Missing X-User-Id header"));
        };

        let user_id = raw
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .ok_or_else(|| unauthorized("Invalid X-User-Id header"))?;

        match UserManager::new(&state.pool).get_user(user_id).await {
            Ok(_) => Ok(Owner(user_id)),
            Err(TaskLensError::UserNotFound(_)) => Err(unauthorized("Unknown user")),
            Err(e) => Err(e.into_response()),
        }
    }
}

/// JSON request body whose rejections (malformed JSON, wrong field types,
/// missing content type) surface as `400 INVALID_INPUT`
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = TaskLensError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(TaskLensError::InvalidInput(rejection.body_text())),
        }
    }
}

pub async fn health() -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse {
        data: HealthResponse {
            status: "ok",
            service: "tasklens",
            version: env!("CARGO_PKG_VERSION"),
        },
    })
}

pub async fn create_user(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateUserRequest>,
) -> Result<impl IntoResponse> {
    let user = UserManager::new(&state.pool)
        .add_user(&req.email, req.name.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse { data: user })))
}

/// The caller's tasks, newest first, each with its threads
pub async fn list_tasks(
    State(state): State<AppState>,
    Owner(user_id): Owner,
    Query(query): Query<TaskListQuery>,
) -> Result<impl IntoResponse> {
    let filter = query.to_filter()?;
    let tasks = TaskManager::new(&state.pool)
        .find_tasks(user_id, &filter)
        .await?;

    Ok(Json(ApiResponse { data: tasks }))
}

/// Create a task; its analysis starts in the background
pub async fn create_task(
    State(state): State<AppState>,
    Owner(user_id): Owner,
    JsonBody(req): JsonBody<CreateTaskRequest>,
) -> Result<impl IntoResponse> {
    let task = TaskManager::with_queue(&state.queue)
        .add_task(user_id, &req.into())
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse { data: task })))
}

/// The polling endpoint: task plus threads, no side effects
pub async fn get_task(
    State(state): State<AppState>,
    Owner(user_id): Owner,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let tasks = TaskManager::new(&state.pool);
    tasks.get_task_for_owner(id, user_id).await?;
    let task = tasks.get_task_with_threads(id).await?;

    Ok(Json(ApiResponse { data: task }))
}

pub async fn update_task(
    State(state): State<AppState>,
    Owner(user_id): Owner,
    Path(id): Path<i64>,
    JsonBody(req): JsonBody<UpdateTaskRequest>,
) -> Result<impl IntoResponse> {
    let tasks = TaskManager::new(&state.pool);
    tasks.get_task_for_owner(id, user_id).await?;
    let task = tasks.update_task(id, &req.into()).await?;

    Ok(Json(ApiResponse { data: task }))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Owner(user_id): Owner,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let tasks = TaskManager::new(&state.pool);
    tasks.get_task_for_owner(id, user_id).await?;
    tasks.delete_task(id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_threads(
    State(state): State<AppState>,
    Owner(user_id): Owner,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    TaskManager::new(&state.pool)
        .get_task_for_owner(id, user_id)
        .await?;
    let threads = ThreadManager::new(&state.pool).list_threads(id).await?;

    Ok(Json(ApiResponse { data: threads }))
}

/// Ask a follow-up question; answers synchronously with the stored answer
pub async fn query_task(
    State(state): State<AppState>,
    Owner(user_id): Owner,
    Path(id): Path<i64>,
    JsonBody(req): JsonBody<QueryRequest>,
) -> Result<impl IntoResponse> {
    TaskManager::new(&state.pool)
        .get_task_for_owner(id, user_id)
        .await?;

    let handler = QueryHandler::new(state.pool.clone(), state.llm.clone(), state.history);
    let answer = handler.submit_query(id, &req.question).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse { data: answer })))
}

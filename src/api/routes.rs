use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;
use super::server::AppState;

/// Create API router with all endpoints
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/users", post(handlers::create_user))
        .route(
            "/tasks",
            get(handlers::list_tasks).post(handlers::create_task),
        )
        .route(
            "/tasks/:id",
            get(handlers::get_task)
                .patch(handlers::update_task)
                .delete(handlers::delete_task),
        )
        .route("/tasks/:id/threads", get(handlers::list_threads))
        .route("/tasks/:id/query", post(handlers::query_task))
}

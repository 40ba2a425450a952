use anyhow::{Context, Result};
use axum::{
    http::{Method, StatusCode},
    response::{IntoResponse, Json},
    Router,
};
use sqlx::SqlitePool;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::models::ApiError;
use super::routes;
use crate::llm::LlmProvider;
use crate::query::HistoryPolicy;
use crate::queue::JobQueue;

/// State shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub queue: JobQueue,
    pub llm: Arc<dyn LlmProvider>,
    pub history: HistoryPolicy,
}

impl AppState {
    pub fn new(queue: JobQueue, llm: Arc<dyn LlmProvider>, history: HistoryPolicy) -> Self {
        Self {
            pool: queue.pool().clone(),
            queue,
            llm,
            history,
        }
    }
}

/// HTTP server bound to one address
pub struct ApiServer {
    addr: SocketAddr,
    state: AppState,
}

impl ApiServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self { addr, state }
    }

    /// Serve until `shutdown` resolves, then finish in-flight requests
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = create_router(self.state);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("Failed to bind to {}", self.addr))?;
        let local = listener.local_addr().context("Failed to read bound address")?;

        tracing::info!("API server listening on http://{}", local);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .context("Server error")?;

        tracing::info!("API server stopped");
        Ok(())
    }
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api", routes::api_routes())
        .fallback(not_found_handler)
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError::new("NOT_FOUND", "The requested endpoint does not exist")),
    )
}

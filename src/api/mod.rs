//! HTTP API over the task store and the query handler.

pub mod handlers;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{create_router, ApiServer, AppState};

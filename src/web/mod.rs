pub mod handlers;
pub mod page;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index).post(handlers::start_task))
        .route("/start", post(handlers::start_task))
        .route("/submit", post(handlers::start_task))
        .route("/stop/{id}", post(handlers::stop_task))
        .route("/status/{id}", get(handlers::task_status))
        .route("/log", get(handlers::target_log))
        .route("/log/{id}", get(handlers::task_log))
        .route("/logs/{id}", get(handlers::task_log))
        .route("/download/{id}", get(handlers::download_log))
        .route("/tasks", get(handlers::list_tasks))
        .route("/health", get(handlers::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

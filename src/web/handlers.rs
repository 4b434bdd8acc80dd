use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    Form,
};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::page::Flash;
use crate::features::activity_log;
use crate::features::credentials::parse_app_state;
use crate::scraping::FormRenamer;
use crate::tasks::{RegistryError, TaskSpec};
use crate::types::*;
use crate::AppState;

pub const DEFAULT_TAIL_LINES: usize = 200;
pub const MAX_TAIL_LINES: usize = 5000;
const MAX_TARGET_ID_LEN: usize = 64;
const MAX_TARGET_NAME_LEN: usize = 200;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn render(state: &AppState, status: StatusCode, flash: Option<Flash>) -> Response {
    match state.pages.index(&state.registry.list_active(), flash.as_ref()) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            error!("index render failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "template error").into_response()
        }
    }
}

/// Target ids end up inside URLs, so keep them to a conservative charset.
pub fn validate_target_id(raw: &str) -> Result<String, String> {
    let id = raw.trim();
    if id.is_empty() {
        return Err("Target ID is required".to_string());
    }
    if id.len() > MAX_TARGET_ID_LEN {
        return Err(format!("Target ID is longer than {} characters", MAX_TARGET_ID_LEN));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err("Target ID may only contain letters, digits, '-', '_' and '.'".to_string());
    }
    Ok(id.to_string())
}

pub fn validate_target_name(raw: &str) -> Result<String, String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err("Name to lock is required".to_string());
    }
    if name.chars().count() > MAX_TARGET_NAME_LEN {
        return Err(format!("Name is longer than {} characters", MAX_TARGET_NAME_LEN));
    }
    Ok(name.to_string())
}

pub async fn index(State(state): State<Arc<AppState>>) -> Response {
    render(&state, StatusCode::OK, None)
}

pub async fn start_task(
    State(state): State<Arc<AppState>>,
    Form(form): Form<StartTaskForm>,
) -> Response {
    if !state.access_key_matches(form.access_key.trim()) {
        warn!("start rejected: wrong access key");
        return render(&state, StatusCode::UNAUTHORIZED, Some(Flash::error("Wrong access key")));
    }

    let target_id = match validate_target_id(&form.target_id) {
        Ok(id) => id,
        Err(msg) => return render(&state, StatusCode::BAD_REQUEST, Some(Flash::error(msg))),
    };
    let target_name = match validate_target_name(&form.target_name) {
        Ok(name) => name,
        Err(msg) => return render(&state, StatusCode::BAD_REQUEST, Some(Flash::error(msg))),
    };
    let credentials = match parse_app_state(&form.app_state) {
        Ok(c) => c,
        Err(e) => {
            return render(
                &state,
                StatusCode::BAD_REQUEST,
                Some(Flash::error(format!("Invalid AppState: {}", e))),
            )
        }
    };

    let renamer = match FormRenamer::new(&credentials, (*state.renamer_settings).clone()) {
        Ok(r) => Arc::new(r),
        Err(e) => {
            return render(
                &state,
                StatusCode::BAD_REQUEST,
                Some(Flash::error(format!("Cannot use AppState: {}", e))),
            )
        }
    };

    let spec = TaskSpec {
        target_id,
        target_name,
    };
    match state.registry.start(spec, renamer).await {
        Ok(task) => {
            info!(
                "started task {} for {} with {} cookies",
                task.id,
                task.target_id,
                credentials.len()
            );
            render(
                &state,
                StatusCode::OK,
                Some(Flash::success(format!(
                    "Task {} started: locking '{}' on {}",
                    task.id, task.target_name, task.target_id
                ))),
            )
        }
        Err(e @ RegistryError::TargetActive { .. }) => {
            render(&state, StatusCode::CONFLICT, Some(Flash::error(e.to_string())))
        }
        Err(e) => {
            error!("task start failed: {}", e);
            render(
                &state,
                StatusCode::INTERNAL_SERVER_ERROR,
                Some(Flash::error(e.to_string())),
            )
        }
    }
}

pub async fn stop_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<StopResponse>) {
    match state.registry.stop(&id) {
        Some(task) => (
            StatusCode::OK,
            Json(StopResponse {
                success: true,
                message: format!("Task {} is {}.", task.id, task.status),
            }),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(StopResponse {
                success: false,
                message: "Task not found".to_string(),
            }),
        ),
    }
}

pub async fn task_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskSnapshot>, ApiError> {
    state
        .registry
        .get(&id)
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Task not found"))
}

pub async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<Vec<TaskSnapshot>> {
    Json(state.registry.list_active())
}

#[derive(Debug, serde::Deserialize)]
pub struct TailQuery {
    #[serde(default)]
    pub lines: Option<usize>,
}

async fn tail_response(state: &AppState, id: &str, lines: Option<usize>) -> Response {
    let Some(path) = state.registry.log_file(id) else {
        return (StatusCode::NOT_FOUND, "Task not found").into_response();
    };
    let n = lines.unwrap_or(DEFAULT_TAIL_LINES).clamp(1, MAX_TAIL_LINES);
    match activity_log::tail(&path, n).await {
        Ok(lines) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            lines.join("\n"),
        )
            .into_response(),
        Err(e) => {
            error!("reading {} failed: {}", path.display(), e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Could not read log").into_response()
        }
    }
}

pub async fn task_log(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(q): Query<TailQuery>,
) -> Response {
    tail_response(&state, &id, q.lines).await
}

/// `/log?groupId=<target>` — newest task for that target.
pub async fn target_log(State(state): State<Arc<AppState>>, Query(q): Query<LogQuery>) -> Response {
    let Some(target) = q.group_id.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "groupId is required").into_response();
    };
    match state.registry.latest_for_target(target) {
        Some(task) => tail_response(&state, &task.id, q.lines).await,
        None => (StatusCode::NOT_FOUND, "No task for that target").into_response(),
    }
}

pub async fn download_log(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let Some(path) = state.registry.log_file(&id) else {
        return (StatusCode::NOT_FOUND, "Task not found").into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "application/x-ndjson".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"log_{}.jsonl\"", id),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, "Log not written yet").into_response()
        }
        Err(e) => {
            error!("reading {} failed: {}", path.display(), e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Could not read log").into_response()
        }
    }
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "name-lock",
        "version": env!("CARGO_PKG_VERSION"),
        "active_tasks": state.registry.list_active().len(),
    }))
}

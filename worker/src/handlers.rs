use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use common::{TaskInfo, TaskStatus};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::manager::TaskManagerError;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/task", get(list_tasks))
        .route(
            "/v1/task/:task_id",
            get(get_task_info).post(create_task).delete(delete_task),
        )
        .route("/v1/task/:task_id/status", get(get_task_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn to_status_code(err: TaskManagerError) -> StatusCode {
    match err {
        TaskManagerError::InvalidTaskId(e) => {
            warn!("task id inválido: {}", e);
            StatusCode::BAD_REQUEST
        }
        TaskManagerError::TaskNotFound(_) => StatusCode::NOT_FOUND,
    }
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

async fn list_tasks(State(state): State<AppState>) -> Json<Vec<TaskInfo>> {
    Json(state.task_manager.all_task_infos())
}

// Registra la tarea (si ya existe, la devuelve tal cual)
async fn create_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskInfo>, StatusCode> {
    let task = state
        .task_manager
        .create_or_get_task(&task_id)
        .map_err(to_status_code)?;
    Ok(Json(task.get_info()))
}

async fn get_task_info(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskInfo>, StatusCode> {
    state
        .task_manager
        .get_task_info(&task_id)
        .map(Json)
        .map_err(to_status_code)
}

async fn get_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatus>, StatusCode> {
    state
        .task_manager
        .get_task_status(&task_id)
        .map(Json)
        .map_err(to_status_code)
}

#[derive(Debug, Deserialize)]
struct DeleteParams {
    #[serde(default = "default_abort")]
    abort: bool,
}

fn default_abort() -> bool {
    true
}

async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<TaskInfo>, StatusCode> {
    state
        .task_manager
        .delete_task(&task_id, params.abort)
        .map(Json)
        .map_err(to_status_code)
}

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use http::{header, StatusCode};
use serde_json::json;
use tracing::{error, info};

use super::AppState;
use crate::{
    metrics::gather_metrics,
    recurrence::RecurrenceInput,
    store::{Task, TaskId},
    Error,
};

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}

/// Audit trail of alerts raised for one task.
pub async fn task_alerts(State(state): State<AppState>, Path(id): Path<TaskId>) -> Response {
    if let Err(response) = load_task(&state, id).await {
        return response;
    }

    match state.repos.alert_events.list_alerts_for_task(id).await {
        Ok(events) => Json(json!({ "task_id": id, "alerts": events })).into_response(),
        Err(e) => internal_error("list alerts", id, e),
    }
}

pub async fn get_schedule(State(state): State<AppState>, Path(id): Path<TaskId>) -> Response {
    let task = match load_task(&state, id).await {
        Ok(task) => task,
        Err(response) => return response,
    };

    let schedule = match state.schedules.get(id).await {
        Ok(Some(schedule)) => schedule,
        Ok(None) => return not_found(format!("task {} has no recurrence schedule", id)),
        Err(e) => return internal_error("load schedule", id, e),
    };

    match state.schedules.next_occurrence(&task, Utc::now()).await {
        Ok(next) => Json(json!({
            "task_id": id,
            "schedule": schedule,
            "next_occurrence": next,
        }))
        .into_response(),
        Err(e) => internal_error("expand schedule", id, e),
    }
}

/// Resolves the recurrence form against the task's start date and stores it.
pub async fn put_schedule(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
    Json(input): Json<RecurrenceInput>,
) -> Response {
    let task = match load_task(&state, id).await {
        Ok(task) => task,
        Err(response) => return response,
    };

    match state.schedules.apply(id, &input, task.start_date).await {
        Ok(schedule) => Json(json!({ "task_id": id, "schedule": schedule })).into_response(),
        Err(Error::Validation(message)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": message })),
        )
            .into_response(),
        Err(e) => internal_error("save schedule", id, e),
    }
}

pub async fn delete_schedule(State(state): State<AppState>, Path(id): Path<TaskId>) -> Response {
    match state.schedules.remove(id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found(format!("task {} has no recurrence schedule", id)),
        Err(e) => internal_error("delete schedule", id, e),
    }
}

/// Hook for status transitions: evaluates the task's deadline immediately
/// instead of waiting for the next poll tick.
pub async fn evaluate_task(State(state): State<AppState>, Path(id): Path<TaskId>) -> Response {
    let task = match load_task(&state, id).await {
        Ok(task) => task,
        Err(response) => return response,
    };

    let outcome = state.scheduler.on_status_change(&task, Utc::now()).await;
    info!(task_id = id, ?outcome, "Evaluated task after status change");
    Json(json!({ "task_id": id, "status": task.status, "outcome": outcome })).into_response()
}

async fn load_task(state: &AppState, id: TaskId) -> Result<Task, Response> {
    match state.repos.tasks.get_task(id).await {
        Ok(Some(task)) => Ok(task),
        Ok(None) => Err(not_found(format!("task {} not found", id))),
        Err(e) => Err(internal_error("load task", id, e)),
    }
}

fn not_found(message: String) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
}

fn internal_error(action: &str, id: TaskId, e: Error) -> Response {
    error!("Failed to {} for task {}: {}", action, id, e);
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

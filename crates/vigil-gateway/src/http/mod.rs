//! HTTP handlers: the CRUD collaborator surface over the scheduling core.

pub mod health;
pub mod items;
pub mod logs;
pub mod speech;

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

/// Uniform error body: `{"error": {"code": ..., "message": ...}}`.
pub(crate) fn api_error(
    status: StatusCode,
    code: &str,
    message: impl std::fmt::Display,
) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(json!({ "error": { "code": code, "message": message.to_string() } })),
    )
}

/// Map a scheduler error onto an HTTP response.
pub(crate) fn scheduler_error(e: vigil_scheduler::SchedulerError) -> (StatusCode, Json<Value>) {
    use vigil_scheduler::SchedulerError;
    match e {
        SchedulerError::ItemNotFound { id } => api_error(
            StatusCode::NOT_FOUND,
            "ITEM_NOT_FOUND",
            format!("item not found: {id}"),
        ),
        other => api_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", other),
    }
}

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use vigil_scheduler::OccurrenceLog;

use super::scheduler_error;
use crate::app::AppState;

#[derive(Deserialize)]
pub struct LogQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

/// GET /logs?limit=N, recent occurrence logs newest first.
pub async fn recent_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Vec<OccurrenceLog>>, (StatusCode, Json<Value>)> {
    let logs = state
        .store
        .recent_logs(query.limit)
        .map_err(scheduler_error)?;
    Ok(Json(logs))
}

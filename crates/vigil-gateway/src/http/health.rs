use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health, liveness probe returning server metadata.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "speech_backend": state.backend,
        "misfire_grace_secs": state.config.scheduler.misfire_grace_secs,
    }))
}

/// GET /now, the server's idea of local wall-clock time, for debugging
/// trigger expectations against the host clock.
pub async fn now_handler() -> Json<Value> {
    let now = chrono::Local::now();
    Json(json!({
        "now": now.naive_local().format("%Y-%m-%d %H:%M:%S").to_string(),
        "offset": now.offset().to_string(),
    }))
}

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use vigil_speech::DeliveryRequest;

use crate::app::AppState;

/// GET /speech/status, the observable delivery counters.
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let snap = state.stats.snapshot();
    Json(json!({
        "backend": state.backend,
        "queue_depth": snap.queue_depth,
        "spoken_count": snap.spoken_count,
        "last_spoken_at": snap.last_spoken_at,
        "last_error": snap.last_error,
    }))
}

#[derive(Deserialize)]
pub struct SpeakRequest {
    pub text: String,
}

/// POST /speech/say, debug enqueue of raw text. No occurrence behind it,
/// so no log row is written either way.
pub async fn say_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SpeakRequest>,
) -> Json<Value> {
    state.queue.enqueue(DeliveryRequest {
        log_id: None,
        text: req.text,
    });
    Json(json!({ "ok": true }))
}

//! Item CRUD. Every mutation validates first, writes the store, then
//! synchronously updates the trigger registry through the scheduler handle;
//! the response is not sent until the registry reflects the store.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use vigil_core::TimeOfDay;
use vigil_scheduler::{Item, NewItem};

use super::{api_error, scheduler_error};
use crate::app::AppState;

type ApiResult<T> = Result<T, (StatusCode, Json<Value>)>;

/// Reject a malformed time-of-day before any store or registry mutation.
fn validate(new: &NewItem) -> ApiResult<()> {
    new.time_of_day
        .parse::<TimeOfDay>()
        .map(|_| ())
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, "INVALID_TIME_OF_DAY", e))
}

/// POST /items
pub async fn create_item(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewItem>,
) -> ApiResult<Json<Item>> {
    validate(&payload)?;
    let item = state.store.insert_item(&payload).map_err(scheduler_error)?;
    state
        .scheduler
        .on_item_created(item.clone())
        .await
        .map_err(scheduler_error)?;
    Ok(Json(item))
}

/// GET /items
pub async fn list_items(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Item>>> {
    let items = state.store.list_items().map_err(scheduler_error)?;
    Ok(Json(items))
}

/// GET /items/{id}
pub async fn get_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Item>> {
    state
        .store
        .get_item(id)
        .map_err(scheduler_error)?
        .map(Json)
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                "ITEM_NOT_FOUND",
                format!("item not found: {id}"),
            )
        })
}

/// PUT /items/{id}
pub async fn update_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<NewItem>,
) -> ApiResult<Json<Item>> {
    validate(&payload)?;
    let item = state
        .store
        .update_item(id, &payload)
        .map_err(scheduler_error)?;
    state
        .scheduler
        .on_item_updated(item.clone())
        .await
        .map_err(scheduler_error)?;
    Ok(Json(item))
}

/// DELETE /items/{id}. Occurrence logs cascade at the store.
pub async fn delete_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    state.store.delete_item(id).map_err(scheduler_error)?;
    state
        .scheduler
        .on_item_deleted(id)
        .await
        .map_err(scheduler_error)?;
    Ok(Json(json!({ "ok": true })))
}

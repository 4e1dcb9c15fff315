use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use vigil_core::config::VigilConfig;
use vigil_scheduler::{ScheduleStore, SchedulerHandle};
use vigil_speech::{DeliveryQueue, DeliveryStats};

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: VigilConfig,
    pub store: Arc<ScheduleStore>,
    pub scheduler: SchedulerHandle,
    pub queue: DeliveryQueue,
    pub stats: Arc<DeliveryStats>,
    /// Speech backend label, surfaced on the status endpoint.
    pub backend: &'static str,
}

impl AppState {
    pub fn new(
        config: VigilConfig,
        store: Arc<ScheduleStore>,
        scheduler: SchedulerHandle,
        queue: DeliveryQueue,
        stats: Arc<DeliveryStats>,
        backend: &'static str,
    ) -> Self {
        Self {
            config,
            store,
            scheduler,
            queue,
            stats,
            backend,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/now", get(crate::http::health::now_handler))
        .route(
            "/items",
            get(crate::http::items::list_items).post(crate::http::items::create_item),
        )
        .route(
            "/items/{id}",
            get(crate::http::items::get_item)
                .put(crate::http::items::update_item)
                .delete(crate::http::items::delete_item),
        )
        .route("/logs", get(crate::http::logs::recent_logs))
        .route("/speech/status", get(crate::http::speech::status_handler))
        .route("/speech/say", post(crate::http::speech::say_handler))
        .with_state(state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

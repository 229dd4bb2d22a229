//! HTTP route table.

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Creates the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/sensors", get(handlers::list_sensors))
        .route("/measurements", post(handlers::create_measurement))
        .route("/measurements/:sensor_id", get(handlers::get_measurements))
        .route(
            "/measurements/:sensor_id/aggregated",
            get(handlers::get_aggregated),
        )
        .route(
            "/measurements/:sensor_id/statistics",
            get(handlers::get_statistics),
        )
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

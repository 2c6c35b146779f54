pub mod error;
pub mod health;
pub mod metrics;
pub mod scans;
pub mod search;
pub mod worker;

use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

/// API routes without transport layers, shared by the server and tests.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/search", post(search::search_places))
        .route("/api/v1/scans", post(scans::create_scan))
        .route("/api/v1/scans/{session_id}", get(scans::get_scan))
        .route(
            "/api/v1/scans/{session_id}/progress",
            get(scans::scan_progress),
        )
        .route("/api/v1/worker", post(worker::process_one))
        .with_state(state)
}

use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;

use crate::schemas::HealthResponse;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
}

/// Liveness only: never touches the service.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

//! HTTP surface over `ForecastService`.
//!
//! Handlers are thin: they decode the request, hand the service call to the
//! blocking pool, and map `PipelineError` kinds onto status codes.

pub mod error;
pub mod routes;
pub mod schemas;
pub mod state;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::AppState;

/// Full application router with tracing and CORS layers.
pub fn app(state: Arc<AppState>) -> Router {
    routes::api_router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub mod forecast;
pub mod health;
pub mod model;
pub mod pipelines;
pub mod price;

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// Assemble the API router.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(health::routes())
        .merge(price::routes())
        .merge(forecast::routes())
        .merge(pipelines::routes())
        .merge(model::routes())
}

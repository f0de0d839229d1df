use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;

use crate::error::ApiError;
use crate::schemas::{ForecastQuery, ForecastRequest, ForecastResponse};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/v1/forecast", get(latest_forecast).post(generate_forecast))
}

/// Latest forecast. Served from the persisted table when the active model
/// produced it; trains first when nothing is registered.
pub async fn latest_forecast(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ForecastQuery>, QueryRejection>,
) -> Result<Json<ForecastResponse>, ApiError> {
    let Query(query) = query?;
    let result = state
        .blocking(move |service| service.latest_forecast(query.days_ahead))
        .await?;
    Ok(Json(result.into()))
}

/// Forecast from the active model, or retrain first when `retrain` is set.
pub async fn generate_forecast(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ForecastRequest>, JsonRejection>,
) -> Result<Json<ForecastResponse>, ApiError> {
    let Json(request) = body?;
    tracing::info!(days_ahead = ?request.days_ahead, retrain = request.retrain, "forecast requested");
    let result = state
        .blocking(move |service| service.generate_forecast(request.days_ahead, request.retrain))
        .await?;
    Ok(Json(result.into()))
}

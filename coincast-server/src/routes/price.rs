use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;

use crate::error::ApiError;
use crate::schemas::{CurrentPriceResponse, PriceQuery};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/v1/price/current", get(current_price))
}

pub async fn current_price(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PriceQuery>, QueryRejection>,
) -> Result<Json<CurrentPriceResponse>, ApiError> {
    let Query(query) = query?;
    let quote = state
        .blocking(move |service| service.current_price(query.symbol.as_deref()))
        .await?;
    Ok(Json(quote.into()))
}

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;

use coincast_runner::PipelineError;

use crate::error::ApiError;
use crate::schemas::{ModelInfoResponse, ModelVersionsResponse};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/model/info", get(model_info))
        .route("/api/v1/model/versions", get(model_versions))
}

/// The active version; 404 `ModelNotFoundError` until one has been accepted.
pub async fn model_info(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ModelInfoResponse>, ApiError> {
    let info = state.blocking(|service| service.model_info()).await?;
    if info.active.is_none() {
        return Err(PipelineError::ModelNotFound(format!(
            "no accepted version of '{}' ({} registered)",
            info.model_name, info.registered_versions
        ))
        .into());
    }
    Ok(Json(info.into()))
}

pub async fn model_versions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ModelVersionsResponse>, ApiError> {
    let index = state
        .blocking(|service| Ok(service.registry().index()?))
        .await?;
    Ok(Json(ModelVersionsResponse {
        model_name: index.model_name,
        active_version: index.active_version,
        versions: index.versions,
    }))
}

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;

use crate::error::ApiError;
use crate::schemas::{PipelineRunRequest, PipelineRunResponse, PipelinesResponse};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/pipelines", get(list_pipelines))
        .route("/api/v1/pipelines/run", post(run_pipeline))
}

pub async fn list_pipelines(State(state): State<Arc<AppState>>) -> Json<PipelinesResponse> {
    let pipelines = state
        .service
        .available_pipelines()
        .into_iter()
        .map(str::to_string)
        .collect();
    Json(PipelinesResponse { pipelines })
}

pub async fn run_pipeline(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PipelineRunRequest>, JsonRejection>,
) -> Result<Json<PipelineRunResponse>, ApiError> {
    let Json(request) = body?;
    tracing::info!(pipeline = %request.pipeline_name, "pipeline run requested");
    let report = state
        .blocking(move |service| service.run_pipeline(&request.pipeline_name))
        .await?;
    Ok(Json(report.into()))
}

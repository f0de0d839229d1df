use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use coincast_runner::{ErrorKind, PipelineError};

/// Error returned by every API handler.
#[derive(Debug)]
pub enum ApiError {
    /// A failure from the forecast service, carrying its kind.
    Pipeline(PipelineError),
    /// Malformed query string or body.
    BadRequest(String),
    /// The blocking task panicked or was cancelled.
    Internal(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pipeline(e) => write!(f, "{}: {e}", e.kind()),
            Self::BadRequest(msg) => write!(f, "bad_request: {msg}"),
            Self::Internal(msg) => write!(f, "internal_error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// HTTP status for a service error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::DataSourceError => StatusCode::BAD_GATEWAY,
        ErrorKind::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::ConfigurationError => StatusCode::BAD_REQUEST,
        ErrorKind::ModelNotFoundError => StatusCode::NOT_FOUND,
        ErrorKind::UnknownPipelineError => StatusCode::BAD_REQUEST,
        ErrorKind::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::ArtifactMissing => StatusCode::NOT_FOUND,
        ErrorKind::ModelError | ErrorKind::StorageError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            Self::Pipeline(e) => (status_for(e.kind()), e.kind().as_str(), e.to_string()),
            // Request-shape problems are validation failures to the caller.
            Self::BadRequest(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::ValidationError.as_str(),
                msg.clone(),
            ),
            Self::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalError",
                msg.clone(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(%kind, %message, "request failed");
        } else {
            tracing::debug!(%kind, %message, "request rejected");
        }

        let body = json!({ "status": "error", "kind": kind, "message": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        Self::Pipeline(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_maps_to_a_status() {
        let cases = [
            (PipelineError::DataSource("x".into()), 502),
            (PipelineError::Validation("x".into()), 422),
            (PipelineError::Configuration("x".into()), 400),
            (PipelineError::ModelNotFound("x".into()), 404),
            (
                PipelineError::UnknownPipeline {
                    name: "bogus".into(),
                    available: "inference".into(),
                },
                400,
            ),
            (PipelineError::UpstreamUnavailable("x".into()), 503),
            (
                PipelineError::ArtifactMissing {
                    dataset: "train_series".into(),
                },
                404,
            ),
            (PipelineError::Model("x".into()), 500),
            (PipelineError::Storage("x".into()), 500),
        ];
        for (err, code) in cases {
            let kind = err.kind();
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status().as_u16(), code, "{kind}");
        }
    }

    #[test]
    fn bad_request_reports_validation_kind() {
        let response = ApiError::BadRequest("missing field".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}

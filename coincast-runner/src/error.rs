//! Service-level error taxonomy.
//!
//! Every failure a caller can see is one of these kinds. Each kind has a
//! stable machine-readable name that the HTTP layer puts in error bodies.

use coincast_core::{DataError, ModelError, ProcessError, StoreError};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::config::ConfigError;
use crate::registry::RegistryError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("data source error: {0}")]
    DataSource(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("unknown pipeline '{name}' (available: {available})")]
    UnknownPipeline { name: String, available: String },

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("artifact '{dataset}' has not been produced yet")]
    ArtifactMissing { dataset: String },

    #[error("model error: {0}")]
    Model(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Machine-readable error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    DataSourceError,
    ValidationError,
    ConfigurationError,
    ModelNotFoundError,
    UnknownPipelineError,
    UpstreamUnavailable,
    ArtifactMissing,
    ModelError,
    StorageError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DataSourceError => "DataSourceError",
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::ConfigurationError => "ConfigurationError",
            ErrorKind::ModelNotFoundError => "ModelNotFoundError",
            ErrorKind::UnknownPipelineError => "UnknownPipelineError",
            ErrorKind::UpstreamUnavailable => "UpstreamUnavailable",
            ErrorKind::ArtifactMissing => "ArtifactMissing",
            ErrorKind::ModelError => "ModelError",
            ErrorKind::StorageError => "StorageError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::DataSource(_) => ErrorKind::DataSourceError,
            PipelineError::Validation(_) => ErrorKind::ValidationError,
            PipelineError::Configuration(_) => ErrorKind::ConfigurationError,
            PipelineError::ModelNotFound(_) => ErrorKind::ModelNotFoundError,
            PipelineError::UnknownPipeline { .. } => ErrorKind::UnknownPipelineError,
            PipelineError::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            PipelineError::ArtifactMissing { .. } => ErrorKind::ArtifactMissing,
            PipelineError::Model(_) => ErrorKind::ModelError,
            PipelineError::Storage(_) => ErrorKind::StorageError,
        }
    }
}

impl From<DataError> for PipelineError {
    fn from(e: DataError) -> Self {
        if e.is_validation() {
            PipelineError::Validation(e.to_string())
        } else {
            PipelineError::DataSource(e.to_string())
        }
    }
}

impl From<ProcessError> for PipelineError {
    fn from(e: ProcessError) -> Self {
        match e {
            ProcessError::Validation(msg) => PipelineError::Validation(msg),
            ProcessError::Configuration(msg) => PipelineError::Configuration(msg),
        }
    }
}

impl From<ModelError> for PipelineError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::InvalidHyperparameter(_) => PipelineError::Configuration(e.to_string()),
            ModelError::InsufficientData { .. }
            | ModelError::MissingRegressor
            | ModelError::EmptyHorizon => PipelineError::Validation(e.to_string()),
            ModelError::Singular => PipelineError::Model(e.to_string()),
            ModelError::Malformed(_) => PipelineError::Storage(e.to_string()),
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        PipelineError::Storage(e.to_string())
    }
}

impl From<ConfigError> for PipelineError {
    fn from(e: ConfigError) -> Self {
        PipelineError::Configuration(e.to_string())
    }
}

impl From<RegistryError> for PipelineError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::VersionNotFound { .. } => PipelineError::ModelNotFound(e.to_string()),
            RegistryError::InvalidTransition(_) => PipelineError::Configuration(e.to_string()),
            RegistryError::Store(_) | RegistryError::LockPoisoned => {
                PipelineError::Storage(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_errors_split_by_cause() {
        let network: PipelineError = DataError::NetworkUnreachable("refused".into()).into();
        let invalid: PipelineError = DataError::ValidationError("empty".into()).into();
        assert_eq!(network.kind(), ErrorKind::DataSourceError);
        assert_eq!(invalid.kind(), ErrorKind::ValidationError);
    }

    #[test]
    fn process_and_model_errors_map_to_taxonomy() {
        let holdout: PipelineError = ProcessError::Configuration("holdout".into()).into();
        assert_eq!(holdout.kind(), ErrorKind::ConfigurationError);

        let short: PipelineError = ModelError::InsufficientData { got: 1, need: 3 }.into();
        assert_eq!(short.kind(), ErrorKind::ValidationError);

        let hp: PipelineError = ModelError::InvalidHyperparameter("x".into()).into();
        assert_eq!(hp.kind(), ErrorKind::ConfigurationError);

        let malformed: PipelineError = ModelError::Malformed("1 coefficients".into()).into();
        assert_eq!(malformed.kind(), ErrorKind::StorageError);
    }

    #[test]
    fn unknown_pipeline_message_lists_choices() {
        let e = PipelineError::UnknownPipeline {
            name: "bogus".into(),
            available: "data_ingestion, inference".into(),
        };
        assert_eq!(e.kind().as_str(), "UnknownPipelineError");
        assert!(e.to_string().contains("bogus"));
        assert!(e.to_string().contains("inference"));
    }
}

//! Coincast runner: orchestration around the core forecasting pieces.
//!
//! - `config`: TOML parameters
//! - `pipeline`: stage DAG and its nodes (ingestion, processing, training, inference)
//! - `catalog`: named datasets over the staged data directory
//! - `gate` and `registry`: deployment thresholds and the versioned model registry
//! - `tracking` and `reporting`: run history and report artifacts
//! - `service`: the façade the server and CLI call

pub mod catalog;
pub mod config;
pub mod error;
pub mod gate;
pub mod pipeline;
pub mod registry;
pub mod reporting;
pub mod runner;
pub mod service;
pub mod tracking;

pub use catalog::{Artifact, DataCatalog, Dataset};
pub use config::{ConfigError, ForecastConfig};
pub use error::{ErrorKind, PipelineError};
pub use gate::{DeploymentThresholds, GateDecision, GateFailure, RegistrationOutcome};
pub use pipeline::{Node, NodeContext, Pipeline, PipelineName};
pub use registry::{ActiveModel, ModelRegistry, ModelVersionRecord, RegistryError, Stage};
pub use reporting::{ForecastSummary, ModelReport};
pub use runner::{PipelineHook, PipelineRunner, RunInfo, RunOutcome, RunReport, RunStatus};
pub use service::{ForecastResult, ForecastService, ForecastSource, ModelInfo};
pub use tracking::{ExperimentTracker, TrackedRun, TrackingHook};

//! Request and response bodies.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use coincast_core::{ForecastPoint, Hyperparameters, PriceQuote};
use coincast_runner::{
    ForecastResult, ForecastSource, ForecastSummary, GateDecision, ModelInfo, ModelVersionRecord,
    RunReport, Stage,
};

pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            version: API_VERSION.to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PriceQuery {
    #[serde(default)]
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentPriceResponse {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<PriceQuote> for CurrentPriceResponse {
    fn from(quote: PriceQuote) -> Self {
        Self {
            symbol: quote.symbol,
            price: quote.price,
            timestamp: quote.timestamp,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ForecastQuery {
    #[serde(default)]
    pub days_ahead: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ForecastRequest {
    #[serde(default)]
    pub days_ahead: Option<usize>,
    #[serde(default)]
    pub retrain: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionPoint {
    pub date: NaiveDate,
    pub predicted_price: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub trend: f64,
}

impl From<&ForecastPoint> for PredictionPoint {
    fn from(p: &ForecastPoint) -> Self {
        Self {
            date: p.date,
            predicted_price: p.predicted_price,
            lower_bound: p.lower_bound,
            upper_bound: p.upper_bound,
            trend: p.trend,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResponse {
    pub status: String,
    pub source: ForecastSource,
    pub model_version: u32,
    pub symbol: String,
    pub last_historical_date: NaiveDate,
    pub last_historical_price: f64,
    pub forecast_days: usize,
    pub predictions: Vec<PredictionPoint>,
    pub summary: ForecastSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateDecision>,
}

impl From<ForecastResult> for ForecastResponse {
    fn from(result: ForecastResult) -> Self {
        let table = result.table;
        Self {
            status: "success".to_string(),
            source: result.source,
            model_version: table.model_version,
            symbol: table.symbol.clone(),
            last_historical_date: table.last_training_date,
            last_historical_price: table.last_training_value,
            forecast_days: table.points.len(),
            predictions: table.points.iter().map(PredictionPoint::from).collect(),
            summary: result.summary,
            gate: result.registration.map(|r| r.decision),
        }
    }
}

fn default_pipeline() -> String {
    "__default__".to_string()
}

#[derive(Debug, Deserialize)]
pub struct PipelineRunRequest {
    #[serde(default = "default_pipeline")]
    pub pipeline_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunResponse {
    pub status: String,
    pub pipeline_name: String,
    pub run_id: String,
    pub message: String,
    pub duration_seconds: f64,
    pub nodes_executed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateDecision>,
}

impl From<RunReport> for PipelineRunResponse {
    fn from(report: RunReport) -> Self {
        let model_version = report.registration.as_ref().and_then(|r| r.version());
        let gate = report.registration.map(|r| r.decision);
        Self {
            status: "success".to_string(),
            message: format!(
                "pipeline '{}' completed ({} nodes)",
                report.pipeline,
                report.nodes_executed.len()
            ),
            pipeline_name: report.pipeline,
            run_id: report.run_id.0,
            duration_seconds: report.duration_secs,
            nodes_executed: report.nodes_executed,
            model_version,
            gate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelinesResponse {
    pub pipelines: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfoResponse {
    pub model_name: String,
    pub model_exists: bool,
    pub registered_versions: usize,
    pub version: Option<u32>,
    pub stage: Option<Stage>,
    pub model_type: Option<String>,
    pub training_date: Option<DateTime<Utc>>,
    pub training_start: Option<NaiveDate>,
    pub training_end: Option<NaiveDate>,
    pub n_train: Option<usize>,
    pub metrics: Option<BTreeMap<String, f64>>,
    pub hyperparameters: Option<Hyperparameters>,
}

impl From<ModelInfo> for ModelInfoResponse {
    fn from(info: ModelInfo) -> Self {
        let active = info.active;
        Self {
            model_name: info.model_name,
            model_exists: info.model_exists,
            registered_versions: info.registered_versions,
            version: active.as_ref().map(|r| r.version),
            stage: active.as_ref().map(|r| r.stage),
            model_type: active.as_ref().map(|r| r.model_type.clone()),
            training_date: active.as_ref().map(|r| r.created_at),
            training_start: active.as_ref().map(|r| r.training_start),
            training_end: active.as_ref().map(|r| r.training_end),
            n_train: active.as_ref().map(|r| r.n_train),
            metrics: active.as_ref().map(|r| r.metrics.as_map()),
            hyperparameters: active.map(|r| r.hyperparameters),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersionsResponse {
    pub model_name: String,
    pub active_version: Option<u32>,
    pub versions: Vec<ModelVersionRecord>,
}

//! Reporting artifacts: model report, forecast summary and forecast CSV.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use coincast_core::{EvaluationMetrics, ForecastTable, Hyperparameters, TimeSeriesFrame};

use crate::error::PipelineError;
use crate::gate::GateDecision;

// ─── Model report ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingInfo {
    pub n_samples: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub price_range: Option<PriceRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestInfo {
    pub n_samples: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Written to `08_reporting/model_report.json` after every evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelReport {
    pub model_type: String,
    pub generated_at: DateTime<Utc>,
    pub training_info: TrainingInfo,
    pub test_info: TestInfo,
    pub metrics: BTreeMap<String, f64>,
    pub hyperparameters: Hyperparameters,
    pub gate_passed: bool,
    pub gate_failures: Vec<String>,
}

impl ModelReport {
    pub fn build(
        model_type: &str,
        train: &TimeSeriesFrame,
        test: &TimeSeriesFrame,
        metrics: &EvaluationMetrics,
        hyperparameters: &Hyperparameters,
        decision: &GateDecision,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            model_type: model_type.to_string(),
            generated_at,
            training_info: TrainingInfo {
                n_samples: train.len(),
                start_date: train.first().map(|o| o.date),
                end_date: train.last().map(|o| o.date),
                price_range: train.value_stats().map(|s| PriceRange {
                    min: s.min,
                    max: s.max,
                    mean: s.mean,
                }),
            },
            test_info: TestInfo {
                n_samples: test.len(),
                start_date: test.first().map(|o| o.date),
                end_date: test.last().map(|o| o.date),
            },
            metrics: metrics.as_map(),
            hyperparameters: hyperparameters.clone(),
            gate_passed: decision.accepted,
            gate_failures: decision.failures.iter().map(ToString::to_string).collect(),
        }
    }
}

// ─── Forecast summary ───────────────────────────────────────────────

/// Headline numbers of one forecast table.
///
/// Every optional field is `None` when the table has too few rows to define it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub model_version: u32,
    pub symbol: String,
    pub last_historical_date: NaiveDate,
    pub last_historical_price: f64,
    pub forecast_days: usize,
    pub forecast_start: Option<NaiveDate>,
    pub forecast_end: Option<NaiveDate>,
    pub first_prediction: Option<f64>,
    pub last_prediction: Option<f64>,
    pub max_prediction: Option<f64>,
    pub min_prediction: Option<f64>,
    pub expected_change_7d_pct: Option<f64>,
    pub expected_change_30d_pct: Option<f64>,
    pub expected_change_end_pct: Option<f64>,
    pub avg_interval_width: Option<f64>,
}

impl ForecastSummary {
    pub fn from_table(table: &ForecastTable) -> Self {
        let points = &table.points;
        let base = table.last_training_value;
        let change_pct = |price: f64| {
            if base.abs() > f64::EPSILON {
                Some((price - base) / base * 100.0)
            } else {
                None
            }
        };
        let change_at = |day: usize| {
            points
                .get(day - 1)
                .and_then(|p| change_pct(p.predicted_price))
        };
        let predicted = points.iter().map(|p| p.predicted_price);

        Self {
            model_version: table.model_version,
            symbol: table.symbol.clone(),
            last_historical_date: table.last_training_date,
            last_historical_price: base,
            forecast_days: points.len(),
            forecast_start: points.first().map(|p| p.date),
            forecast_end: points.last().map(|p| p.date),
            first_prediction: points.first().map(|p| p.predicted_price),
            last_prediction: points.last().map(|p| p.predicted_price),
            max_prediction: predicted.clone().reduce(f64::max),
            min_prediction: predicted.reduce(f64::min),
            expected_change_7d_pct: change_at(7),
            expected_change_30d_pct: change_at(30),
            expected_change_end_pct: points
                .last()
                .and_then(|p| change_pct(p.predicted_price)),
            avg_interval_width: if points.is_empty() {
                None
            } else {
                Some(
                    points
                        .iter()
                        .map(|p| p.upper_bound - p.lower_bound)
                        .sum::<f64>()
                        / points.len() as f64,
                )
            },
        }
    }
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Forecast table as CSV with a header row.
pub fn forecast_csv(table: &ForecastTable) -> Result<String, PipelineError> {
    let csv_err = |e: csv::Error| PipelineError::Storage(format!("forecast csv: {e}"));
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "date",
        "predicted_price",
        "lower_bound",
        "upper_bound",
        "trend",
    ])
    .map_err(csv_err)?;
    for p in &table.points {
        wtr.write_record([
            p.date.to_string(),
            format!("{:.2}", p.predicted_price),
            format!("{:.2}", p.lower_bound),
            format!("{:.2}", p.upper_bound),
            format!("{:.2}", p.trend),
        ])
        .map_err(csv_err)?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| PipelineError::Storage(format!("forecast csv: {e}")))?;
    String::from_utf8(bytes).map_err(|e| PipelineError::Storage(format!("forecast csv: {e}")))
}

//! Inference stage: forecast from the active registered model and summarize it.

use tracing::info;

use coincast_core::{ForecastPoint, ForecastTable};

use crate::catalog::{Artifact, Dataset};
use crate::error::PipelineError;
use crate::pipeline::{Node, NodeContext, Pipeline};
use crate::registry::ActiveModel;
use crate::reporting::{forecast_csv, ForecastSummary};

/// Written next to the summary.
pub const FORECAST_CSV_PATH: &str = "08_reporting/forecast.csv";

/// Forecast the `days` following the model's last training date.
pub fn forecast_table(
    active: &ActiveModel,
    symbol: &str,
    days: usize,
) -> Result<ForecastTable, PipelineError> {
    let model = &active.model;
    let points = model
        .forecast(days)?
        .into_iter()
        .map(|p| ForecastPoint {
            date: p.date,
            predicted_price: p.yhat,
            lower_bound: p.lower,
            upper_bound: p.upper,
            trend: p.trend,
        })
        .collect();
    Ok(ForecastTable {
        model_version: active.record.version,
        symbol: symbol.to_string(),
        last_training_date: model.last_date(),
        last_training_value: model.last_value(),
        points,
    })
}

pub struct GenerateForecast;

impl Node for GenerateForecast {
    fn name(&self) -> &'static str {
        "generate_forecast"
    }

    fn inputs(&self) -> &'static [Dataset] {
        &[Dataset::RegisteredModel]
    }

    fn outputs(&self) -> &'static [Dataset] {
        &[Dataset::Forecast]
    }

    fn run(&self, ctx: &mut NodeContext<'_>) -> Result<(), PipelineError> {
        let active = ctx.catalog.active_model()?;
        let days = ctx.config.forecast.days_ahead;
        if days == 0 || days > ctx.config.forecast.max_days_ahead {
            return Err(PipelineError::Validation(format!(
                "days_ahead must be in 1..={}, got {days}",
                ctx.config.forecast.max_days_ahead
            )));
        }
        let table = forecast_table(&active, &ctx.config.binance.symbol, days)?;
        info!(
            version = table.model_version,
            days,
            start = ?table.points.first().map(|p| p.date),
            "generated forecast"
        );
        ctx.catalog.save(Dataset::Forecast, Artifact::Forecast(table))
    }
}

pub struct SummarizeForecast;

impl Node for SummarizeForecast {
    fn name(&self) -> &'static str {
        "summarize_forecast"
    }

    fn inputs(&self) -> &'static [Dataset] {
        &[Dataset::Forecast]
    }

    fn outputs(&self) -> &'static [Dataset] {
        &[Dataset::ForecastSummary]
    }

    fn run(&self, ctx: &mut NodeContext<'_>) -> Result<(), PipelineError> {
        let table = ctx.catalog.forecast()?;
        let csv = forecast_csv(&table)?;
        coincast_core::data::store::write_bytes_atomic(
            &ctx.catalog.store().path(FORECAST_CSV_PATH),
            csv.as_bytes(),
        )?;
        let summary = ForecastSummary::from_table(&table);
        ctx.catalog
            .save(Dataset::ForecastSummary, Artifact::Summary(Box::new(summary)))
    }
}

pub fn pipeline() -> Result<Pipeline, PipelineError> {
    Pipeline::new(
        "inference",
        vec![Box::new(GenerateForecast), Box::new(SummarizeForecast)],
    )
}

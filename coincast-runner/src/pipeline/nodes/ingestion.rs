//! Ingestion stage: fetch candles from the market-data provider, then validate them.

use tracing::info;

use coincast_core::{fetch_candles, validate_candles, IngestRequest};

use crate::catalog::{Artifact, Dataset};
use crate::error::PipelineError;
use crate::pipeline::{Node, NodeContext, Pipeline};

pub struct FetchCandles;

impl Node for FetchCandles {
    fn name(&self) -> &'static str {
        "fetch_candles"
    }

    fn inputs(&self) -> &'static [Dataset] {
        &[]
    }

    fn outputs(&self) -> &'static [Dataset] {
        &[Dataset::RawCandles]
    }

    fn run(&self, ctx: &mut NodeContext<'_>) -> Result<(), PipelineError> {
        let b = &ctx.config.binance;
        let request = IngestRequest::lookback(
            b.symbol.clone(),
            b.interval,
            b.years_of_data,
            ctx.now,
            b.page_limit,
        );
        let series = fetch_candles(ctx.provider, &request)?;
        info!(
            provider = ctx.provider.name(),
            symbol = %series.symbol,
            rows = series.len(),
            "ingested candles"
        );
        ctx.catalog.save(Dataset::RawCandles, Artifact::Candles(series))
    }
}

pub struct ValidateCandles;

impl Node for ValidateCandles {
    fn name(&self) -> &'static str {
        "validate_candles"
    }

    fn inputs(&self) -> &'static [Dataset] {
        &[Dataset::RawCandles]
    }

    fn outputs(&self) -> &'static [Dataset] {
        &[Dataset::ValidatedCandles]
    }

    fn run(&self, ctx: &mut NodeContext<'_>) -> Result<(), PipelineError> {
        let raw = ctx.catalog.candles(Dataset::RawCandles)?;
        let validated = validate_candles(raw)?;
        ctx.catalog
            .save(Dataset::ValidatedCandles, Artifact::Candles(validated))
    }
}

pub fn pipeline() -> Result<Pipeline, PipelineError> {
    Pipeline::new(
        "data_ingestion",
        vec![Box::new(FetchCandles), Box::new(ValidateCandles)],
    )
}

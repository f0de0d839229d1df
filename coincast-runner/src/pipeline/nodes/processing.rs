//! Processing stage: candles to a price series, optional volume feature, holdout split.

use tracing::info;

use coincast_core::{add_volume_feature, build_frame, split_train_test};

use crate::catalog::{Artifact, Dataset};
use crate::error::PipelineError;
use crate::pipeline::{Node, NodeContext, Pipeline};

pub struct BuildSeries;

impl Node for BuildSeries {
    fn name(&self) -> &'static str {
        "build_series"
    }

    fn inputs(&self) -> &'static [Dataset] {
        &[Dataset::ValidatedCandles]
    }

    fn outputs(&self) -> &'static [Dataset] {
        &[Dataset::PrimarySeries]
    }

    fn run(&self, ctx: &mut NodeContext<'_>) -> Result<(), PipelineError> {
        let candles = ctx.catalog.candles(Dataset::ValidatedCandles)?;
        let p = &ctx.config.processing;
        let frame = build_frame(&candles, p.price_column, p.min_observations)?;
        ctx.catalog.save(Dataset::PrimarySeries, Artifact::Series(frame))
    }
}

/// Attaches the volume column when the model uses it; otherwise passes the
/// primary series through.
pub struct AddFeatures;

impl Node for AddFeatures {
    fn name(&self) -> &'static str {
        "add_features"
    }

    fn inputs(&self) -> &'static [Dataset] {
        &[Dataset::PrimarySeries, Dataset::ValidatedCandles]
    }

    fn outputs(&self) -> &'static [Dataset] {
        &[Dataset::FeatureSeries]
    }

    fn run(&self, ctx: &mut NodeContext<'_>) -> Result<(), PipelineError> {
        let frame = ctx.catalog.series(Dataset::PrimarySeries)?;
        let features = if ctx.config.model.hyperparameters.add_volume_regressor {
            let candles = ctx.catalog.candles(Dataset::ValidatedCandles)?;
            add_volume_feature(&frame, &candles)?
        } else {
            frame
        };
        ctx.catalog
            .save(Dataset::FeatureSeries, Artifact::Series(features))
    }
}

pub struct SplitTrainTest;

impl Node for SplitTrainTest {
    fn name(&self) -> &'static str {
        "split_train_test"
    }

    fn inputs(&self) -> &'static [Dataset] {
        &[Dataset::FeatureSeries]
    }

    fn outputs(&self) -> &'static [Dataset] {
        &[Dataset::TrainSeries, Dataset::TestSeries]
    }

    fn run(&self, ctx: &mut NodeContext<'_>) -> Result<(), PipelineError> {
        let frame = ctx.catalog.series(Dataset::FeatureSeries)?;
        let split = split_train_test(&frame, ctx.config.processing.test_size_days)?;
        info!(
            train = split.train.len(),
            test = split.test.len(),
            "split series into train/test"
        );
        ctx.catalog
            .save(Dataset::TrainSeries, Artifact::Series(split.train))?;
        ctx.catalog
            .save(Dataset::TestSeries, Artifact::Series(split.test))
    }
}

pub fn pipeline() -> Result<Pipeline, PipelineError> {
    Pipeline::new(
        "data_processing",
        vec![
            Box::new(BuildSeries),
            Box::new(AddFeatures),
            Box::new(SplitTrainTest),
        ],
    )
}

//! Training stage: fit, evaluate, report, then gate and register.
//!
//! Training never decides registration. The candidate and its metrics are
//! always persisted; `register_model` applies the deployment gate and only
//! accepted candidates reach the registry.

use tracing::{info, warn};

use coincast_core::{evaluate, DecomposableModel};

use crate::catalog::{Artifact, Dataset};
use crate::error::PipelineError;
use crate::gate::RegistrationOutcome;
use crate::pipeline::{Node, NodeContext, Pipeline};
use crate::registry::ActiveModel;
use crate::reporting::ModelReport;

pub struct TrainModel;

impl Node for TrainModel {
    fn name(&self) -> &'static str {
        "train_model"
    }

    fn inputs(&self) -> &'static [Dataset] {
        &[Dataset::TrainSeries]
    }

    fn outputs(&self) -> &'static [Dataset] {
        &[Dataset::CandidateModel]
    }

    fn run(&self, ctx: &mut NodeContext<'_>) -> Result<(), PipelineError> {
        let train = ctx.catalog.series(Dataset::TrainSeries)?;
        let model = DecomposableModel::fit(&train, &ctx.config.model.hyperparameters)?;
        info!(
            n_train = model.n_observations(),
            last_date = %model.last_date(),
            fingerprint = model.training_fingerprint().short(),
            "fitted candidate model"
        );
        ctx.catalog
            .save(Dataset::CandidateModel, Artifact::Model(Box::new(model)))
    }
}

pub struct EvaluateModel;

impl Node for EvaluateModel {
    fn name(&self) -> &'static str {
        "evaluate_model"
    }

    fn inputs(&self) -> &'static [Dataset] {
        &[Dataset::CandidateModel, Dataset::TestSeries]
    }

    fn outputs(&self) -> &'static [Dataset] {
        &[Dataset::ModelMetrics]
    }

    fn run(&self, ctx: &mut NodeContext<'_>) -> Result<(), PipelineError> {
        let model = ctx.catalog.candidate_model()?;
        let test = ctx.catalog.series(Dataset::TestSeries)?;
        let metrics = evaluate(&model, &test)?;
        ctx.catalog.save(Dataset::ModelMetrics, Artifact::Metrics(metrics))
    }
}

pub struct ReportModel;

impl Node for ReportModel {
    fn name(&self) -> &'static str {
        "report_model"
    }

    fn inputs(&self) -> &'static [Dataset] {
        &[Dataset::TrainSeries, Dataset::TestSeries, Dataset::ModelMetrics]
    }

    fn outputs(&self) -> &'static [Dataset] {
        &[Dataset::ModelReport]
    }

    fn run(&self, ctx: &mut NodeContext<'_>) -> Result<(), PipelineError> {
        let train = ctx.catalog.series(Dataset::TrainSeries)?;
        let test = ctx.catalog.series(Dataset::TestSeries)?;
        let metrics = ctx.catalog.metrics()?;
        let decision = ctx.config.deployment.check(&metrics);
        let report = ModelReport::build(
            DecomposableModel::MODEL_TYPE,
            &train,
            &test,
            &metrics,
            &ctx.config.model.hyperparameters,
            &decision,
            ctx.now,
        );
        ctx.catalog
            .save(Dataset::ModelReport, Artifact::Report(Box::new(report)))
    }
}

/// Applies the deployment gate and registers accepted candidates.
///
/// With `refit_on_full`, the registered model is refit on the whole feature
/// series; the recorded metrics stay those of the holdout evaluation.
pub struct RegisterModel;

impl Node for RegisterModel {
    fn name(&self) -> &'static str {
        "register_model"
    }

    fn inputs(&self) -> &'static [Dataset] {
        &[
            Dataset::CandidateModel,
            Dataset::ModelMetrics,
            Dataset::FeatureSeries,
        ]
    }

    fn outputs(&self) -> &'static [Dataset] {
        &[Dataset::Registration, Dataset::RegisteredModel]
    }

    fn run(&self, ctx: &mut NodeContext<'_>) -> Result<(), PipelineError> {
        let metrics = ctx.catalog.metrics()?;
        let decision = ctx.config.deployment.check(&metrics);

        if !decision.accepted {
            warn!(
                failures = %decision.summary(),
                "candidate failed deployment gate, not registered"
            );
            let outcome = RegistrationOutcome {
                decision,
                metrics,
                registered: None,
            };
            return ctx
                .catalog
                .save(Dataset::Registration, Artifact::Registration(Box::new(outcome)));
        }

        let model = if ctx.config.model.refit_on_full {
            let full = ctx.catalog.series(Dataset::FeatureSeries)?;
            info!(rows = full.len(), "refitting accepted model on full series");
            DecomposableModel::fit(&full, &ctx.config.model.hyperparameters)?
        } else {
            ctx.catalog.candidate_model()?
        };

        let record = ctx.catalog.registry().register(
            &model,
            &metrics,
            ctx.config.registry.accepted_stage,
            Some(ctx.run_id.clone()),
        )?;
        let outcome = RegistrationOutcome {
            decision,
            metrics,
            registered: Some(record.clone()),
        };
        ctx.catalog
            .save(Dataset::Registration, Artifact::Registration(Box::new(outcome)))?;
        ctx.catalog.set_active(ActiveModel { record, model });
        Ok(())
    }
}

pub fn pipeline() -> Result<Pipeline, PipelineError> {
    Pipeline::new(
        "model_training",
        vec![
            Box::new(TrainModel),
            Box::new(EvaluateModel),
            Box::new(ReportModel),
            Box::new(RegisterModel),
        ],
    )
}

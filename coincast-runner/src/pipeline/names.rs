//! The fixed set of runnable pipelines.

use std::fmt;

use super::nodes::{inference, ingestion, processing, training};
use super::Pipeline;
use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineName {
    DataIngestion,
    DataProcessing,
    ModelTraining,
    Inference,
    /// Every stage, ingestion through inference.
    Default,
}

impl PipelineName {
    pub const ALL: [PipelineName; 5] = [
        PipelineName::DataIngestion,
        PipelineName::DataProcessing,
        PipelineName::ModelTraining,
        PipelineName::Inference,
        PipelineName::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineName::DataIngestion => "data_ingestion",
            PipelineName::DataProcessing => "data_processing",
            PipelineName::ModelTraining => "model_training",
            PipelineName::Inference => "inference",
            PipelineName::Default => "__default__",
        }
    }

    pub fn available() -> Vec<&'static str> {
        Self::ALL.iter().map(|p| p.as_str()).collect()
    }

    /// Resolve a user-supplied name. `default` is accepted for `__default__`.
    pub fn parse(name: &str) -> Result<Self, PipelineError> {
        let trimmed = name.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == trimmed)
            .or((trimmed == "default").then_some(PipelineName::Default))
            .ok_or_else(|| PipelineError::UnknownPipeline {
                name: name.to_string(),
                available: Self::available().join(", "),
            })
    }

    pub fn build(&self) -> Result<Pipeline, PipelineError> {
        match self {
            PipelineName::DataIngestion => ingestion::pipeline(),
            PipelineName::DataProcessing => processing::pipeline(),
            PipelineName::ModelTraining => training::pipeline(),
            PipelineName::Inference => inference::pipeline(),
            PipelineName::Default => Pipeline::combine(
                self.as_str(),
                vec![
                    ingestion::pipeline()?,
                    processing::pipeline()?,
                    training::pipeline()?,
                    inference::pipeline()?,
                ],
            ),
        }
    }
}

impl fmt::Display for PipelineName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Dataset;

    #[test]
    fn parses_every_listed_name() {
        for name in PipelineName::available() {
            assert_eq!(PipelineName::parse(name).unwrap().as_str(), name);
        }
        assert_eq!(PipelineName::parse("default").unwrap(), PipelineName::Default);
    }

    #[test]
    fn unknown_name_lists_choices() {
        match PipelineName::parse("bogus") {
            Err(PipelineError::UnknownPipeline { name, available }) => {
                assert_eq!(name, "bogus");
                assert!(available.contains("model_training"));
            }
            other => panic!("expected UnknownPipeline, got {other:?}"),
        }
    }

    #[test]
    fn every_pipeline_builds() {
        for name in PipelineName::ALL {
            let pipeline = name.build().unwrap();
            assert!(!pipeline.is_empty(), "{name} is empty");
        }
    }

    #[test]
    fn default_pipeline_runs_stages_in_order_with_no_free_inputs() {
        let pipeline = PipelineName::Default.build().unwrap();
        assert_eq!(
            pipeline.node_names(),
            vec![
                "fetch_candles",
                "validate_candles",
                "build_series",
                "add_features",
                "split_train_test",
                "train_model",
                "evaluate_model",
                "report_model",
                "register_model",
                "generate_forecast",
                "summarize_forecast",
            ]
        );
        assert!(pipeline.free_inputs().is_empty());
    }

    #[test]
    fn partial_pipelines_declare_what_they_need() {
        let training = PipelineName::ModelTraining.build().unwrap();
        let needs: Vec<Dataset> = training.free_inputs().into_iter().collect();
        assert_eq!(
            needs,
            vec![Dataset::FeatureSeries, Dataset::TrainSeries, Dataset::TestSeries]
        );

        let inference = PipelineName::Inference.build().unwrap();
        assert_eq!(
            inference.free_inputs().into_iter().collect::<Vec<_>>(),
            vec![Dataset::RegisteredModel]
        );
    }
}

//! Data catalog: named datasets, where they live, and how they are loaded.
//!
//! Every pipeline node reads and writes through the catalog by dataset name.
//! Saved artifacts are kept in memory for the rest of the run and persisted
//! to the staged directory layout, so a later run can start from any stage.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use coincast_core::{
    ArtifactStore, CandleSeries, DecomposableModel, EvaluationMetrics, ForecastTable,
    StoreError, TimeSeriesFrame,
};

use crate::error::PipelineError;
use crate::gate::RegistrationOutcome;
use crate::registry::{ActiveModel, ModelRegistry};
use crate::reporting::{ForecastSummary, ModelReport};

/// Every dataset a node may declare as input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dataset {
    RawCandles,
    ValidatedCandles,
    PrimarySeries,
    FeatureSeries,
    TrainSeries,
    TestSeries,
    CandidateModel,
    ModelMetrics,
    ModelReport,
    Registration,
    RegisteredModel,
    Forecast,
    ForecastSummary,
}

impl Dataset {
    pub fn name(&self) -> &'static str {
        match self {
            Dataset::RawCandles => "raw_candles",
            Dataset::ValidatedCandles => "validated_candles",
            Dataset::PrimarySeries => "primary_series",
            Dataset::FeatureSeries => "feature_series",
            Dataset::TrainSeries => "train_series",
            Dataset::TestSeries => "test_series",
            Dataset::CandidateModel => "candidate_model",
            Dataset::ModelMetrics => "model_metrics",
            Dataset::ModelReport => "model_report",
            Dataset::Registration => "registration",
            Dataset::RegisteredModel => "registered_model",
            Dataset::Forecast => "forecast",
            Dataset::ForecastSummary => "forecast_summary",
        }
    }

    /// Location under the data directory. The registered model lives in the
    /// registry instead.
    pub fn path(&self) -> Option<&'static str> {
        match self {
            Dataset::RawCandles => Some("01_raw/candles.parquet"),
            Dataset::ValidatedCandles => Some("02_intermediate/candles_validated.parquet"),
            Dataset::PrimarySeries => Some("03_primary/price_series.parquet"),
            Dataset::FeatureSeries => Some("04_feature/price_series_full.parquet"),
            Dataset::TrainSeries => Some("05_model_input/train.parquet"),
            Dataset::TestSeries => Some("05_model_input/test.parquet"),
            Dataset::CandidateModel => Some("06_models/candidate/model.json"),
            Dataset::Registration => Some("06_models/last_registration.json"),
            Dataset::RegisteredModel => None,
            Dataset::Forecast => Some("07_model_output/forecast.parquet"),
            Dataset::ModelMetrics => Some("08_reporting/model_metrics.json"),
            Dataset::ModelReport => Some("08_reporting/model_report.json"),
            Dataset::ForecastSummary => Some("08_reporting/forecast_summary.json"),
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A loaded dataset.
#[derive(Debug, Clone)]
pub enum Artifact {
    Candles(CandleSeries),
    Series(TimeSeriesFrame),
    Model(Box<DecomposableModel>),
    Metrics(EvaluationMetrics),
    Report(Box<ModelReport>),
    Registration(Box<RegistrationOutcome>),
    Active(Box<ActiveModel>),
    Forecast(ForecastTable),
    Summary(Box<ForecastSummary>),
}

impl Artifact {
    fn kind(&self) -> &'static str {
        match self {
            Artifact::Candles(_) => "candles",
            Artifact::Series(_) => "series",
            Artifact::Model(_) => "model",
            Artifact::Metrics(_) => "metrics",
            Artifact::Report(_) => "model report",
            Artifact::Registration(_) => "registration",
            Artifact::Active(_) => "active model",
            Artifact::Forecast(_) => "forecast",
            Artifact::Summary(_) => "forecast summary",
        }
    }
}

pub struct DataCatalog {
    store: ArtifactStore,
    registry: Arc<ModelRegistry>,
    memory: HashMap<Dataset, Artifact>,
}

impl DataCatalog {
    pub fn new(store: ArtifactStore, registry: Arc<ModelRegistry>) -> Self {
        Self {
            store,
            registry,
            memory: HashMap::new(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        self.store.root()
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Dataset already produced during this run, without touching disk.
    pub fn peek(&self, dataset: Dataset) -> Option<&Artifact> {
        self.memory.get(&dataset)
    }

    /// Persist `artifact` as `dataset` and keep it for the rest of the run.
    pub fn save(&mut self, dataset: Dataset, artifact: Artifact) -> Result<(), PipelineError> {
        if let Some(rel) = dataset.path() {
            match &artifact {
                Artifact::Candles(c) => self.store.write_candles(rel, c)?,
                Artifact::Series(s) => self.store.write_series(rel, s)?,
                Artifact::Model(m) => self.store.write_json(rel, m.as_ref())?,
                Artifact::Metrics(m) => self.store.write_json(rel, m)?,
                Artifact::Report(r) => self.store.write_json(rel, r.as_ref())?,
                Artifact::Registration(r) => self.store.write_json(rel, r.as_ref())?,
                Artifact::Forecast(f) => self.store.write_forecast(rel, f)?,
                Artifact::Summary(s) => self.store.write_json(rel, s.as_ref())?,
                Artifact::Active(_) => {
                    return Err(mismatch(dataset, &artifact));
                }
            }
            debug!(dataset = %dataset, path = rel, "saved dataset");
        }
        self.memory.insert(dataset, artifact);
        Ok(())
    }

    /// Load a dataset: this run's copy first, then disk (or the registry).
    pub fn load(&mut self, dataset: Dataset) -> Result<Artifact, PipelineError> {
        if let Some(artifact) = self.memory.get(&dataset) {
            return Ok(artifact.clone());
        }
        let artifact = self.load_persisted(dataset)?;
        self.memory.insert(dataset, artifact.clone());
        Ok(artifact)
    }

    fn load_persisted(&self, dataset: Dataset) -> Result<Artifact, PipelineError> {
        let missing = |e: StoreError| match e {
            StoreError::Missing { .. } => PipelineError::ArtifactMissing {
                dataset: dataset.name().to_string(),
            },
            other => other.into(),
        };

        let Some(rel) = dataset.path() else {
            return match self.registry.load_active()? {
                Some(active) => Ok(Artifact::Active(Box::new(active))),
                None => Err(PipelineError::ModelNotFound(format!(
                    "no active version of '{}' in the registry",
                    self.registry.name()
                ))),
            };
        };

        let artifact = match dataset {
            Dataset::RegisteredModel => {
                return Err(PipelineError::Storage(
                    "registered model is not stored in the data directory".into(),
                ))
            }
            Dataset::RawCandles | Dataset::ValidatedCandles => {
                Artifact::Candles(self.store.read_candles(rel).map_err(missing)?)
            }
            Dataset::PrimarySeries
            | Dataset::FeatureSeries
            | Dataset::TrainSeries
            | Dataset::TestSeries => Artifact::Series(self.store.read_series(rel).map_err(missing)?),
            Dataset::CandidateModel => {
                Artifact::Model(Box::new(self.store.read_json(rel).map_err(missing)?))
            }
            Dataset::ModelMetrics => Artifact::Metrics(self.store.read_json(rel).map_err(missing)?),
            Dataset::ModelReport => {
                Artifact::Report(Box::new(self.store.read_json(rel).map_err(missing)?))
            }
            Dataset::Registration => {
                Artifact::Registration(Box::new(self.store.read_json(rel).map_err(missing)?))
            }
            Dataset::Forecast => Artifact::Forecast(self.store.read_forecast(rel).map_err(missing)?),
            Dataset::ForecastSummary => {
                Artifact::Summary(Box::new(self.store.read_json(rel).map_err(missing)?))
            }
        };
        Ok(artifact)
    }

    // ── Typed accessors ──

    pub fn candles(&mut self, dataset: Dataset) -> Result<CandleSeries, PipelineError> {
        match self.load(dataset)? {
            Artifact::Candles(c) => Ok(c),
            other => Err(mismatch(dataset, &other)),
        }
    }

    pub fn series(&mut self, dataset: Dataset) -> Result<TimeSeriesFrame, PipelineError> {
        match self.load(dataset)? {
            Artifact::Series(s) => Ok(s),
            other => Err(mismatch(dataset, &other)),
        }
    }

    pub fn candidate_model(&mut self) -> Result<DecomposableModel, PipelineError> {
        match self.load(Dataset::CandidateModel)? {
            Artifact::Model(m) => Ok(*m),
            other => Err(mismatch(Dataset::CandidateModel, &other)),
        }
    }

    pub fn metrics(&mut self) -> Result<EvaluationMetrics, PipelineError> {
        match self.load(Dataset::ModelMetrics)? {
            Artifact::Metrics(m) => Ok(m),
            other => Err(mismatch(Dataset::ModelMetrics, &other)),
        }
    }

    pub fn registration(&mut self) -> Result<RegistrationOutcome, PipelineError> {
        match self.load(Dataset::Registration)? {
            Artifact::Registration(r) => Ok(*r),
            other => Err(mismatch(Dataset::Registration, &other)),
        }
    }

    pub fn active_model(&mut self) -> Result<ActiveModel, PipelineError> {
        match self.load(Dataset::RegisteredModel)? {
            Artifact::Active(a) => Ok(*a),
            other => Err(mismatch(Dataset::RegisteredModel, &other)),
        }
    }

    pub fn forecast(&mut self) -> Result<ForecastTable, PipelineError> {
        match self.load(Dataset::Forecast)? {
            Artifact::Forecast(f) => Ok(f),
            other => Err(mismatch(Dataset::Forecast, &other)),
        }
    }

    /// Record the active model for this run without persisting anything.
    pub fn set_active(&mut self, active: ActiveModel) {
        self.memory
            .insert(Dataset::RegisteredModel, Artifact::Active(Box::new(active)));
    }
}

fn mismatch(dataset: Dataset, artifact: &Artifact) -> PipelineError {
    PipelineError::Storage(format!(
        "dataset '{dataset}' cannot hold a {} artifact",
        artifact.kind()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use coincast_core::Observation;

    fn catalog(dir: &Path) -> DataCatalog {
        let registry = ModelRegistry::open(dir.join("06_models"), "btc", "test").unwrap();
        DataCatalog::new(ArtifactStore::new(dir), Arc::new(registry))
    }

    fn frame() -> TimeSeriesFrame {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        TimeSeriesFrame::new(
            (0..5)
                .map(|i| Observation::new(start + Duration::days(i), 50.0 + i as f64))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn paths_follow_staged_layout() {
        assert_eq!(Dataset::RawCandles.path(), Some("01_raw/candles.parquet"));
        assert_eq!(Dataset::TestSeries.path(), Some("05_model_input/test.parquet"));
        assert_eq!(Dataset::Forecast.path(), Some("07_model_output/forecast.parquet"));
        assert_eq!(Dataset::RegisteredModel.path(), None);
    }

    #[test]
    fn saved_series_survives_a_new_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = catalog(dir.path());
        first
            .save(Dataset::TrainSeries, Artifact::Series(frame()))
            .unwrap();
        assert!(dir.path().join("05_model_input/train.parquet").exists());

        let mut second = catalog(dir.path());
        assert_eq!(second.series(Dataset::TrainSeries).unwrap(), frame());
    }

    #[test]
    fn missing_dataset_is_reported_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = catalog(dir.path());
        match catalog.series(Dataset::PrimarySeries) {
            Err(PipelineError::ArtifactMissing { dataset }) => {
                assert_eq!(dataset, "primary_series")
            }
            other => panic!("expected ArtifactMissing, got {other:?}"),
        }
    }

    #[test]
    fn empty_registry_means_model_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = catalog(dir.path());
        assert!(matches!(
            catalog.active_model(),
            Err(PipelineError::ModelNotFound(_))
        ));
    }

    #[test]
    fn wrong_artifact_type_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = catalog(dir.path());
        catalog
            .save(Dataset::PrimarySeries, Artifact::Series(frame()))
            .unwrap();
        assert!(matches!(
            catalog.candles(Dataset::PrimarySeries),
            Err(PipelineError::Storage(_))
        ));
    }
}

//! `ForecastService`: the one entry point the HTTP server and CLI use.
//!
//! The service owns the configuration, the provider, the registry handle and
//! the runner. Persisted artifacts and the registry are the only state shared
//! between calls. Pipeline runs are serialized through one lock, so two
//! retrain requests never interleave; reads that find a usable persisted
//! forecast never take it.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use coincast_core::{ArtifactStore, ForecastTable, MarketDataProvider, PriceQuote, StoreError};

use crate::catalog::{DataCatalog, Dataset};
use crate::config::ForecastConfig;
use crate::error::PipelineError;
use crate::gate::RegistrationOutcome;
use crate::pipeline::PipelineName;
use crate::registry::{ModelRegistry, ModelVersionRecord, Stage};
use crate::reporting::ForecastSummary;
use crate::runner::{PipelineHook, PipelineRunner, RunReport};
use crate::tracking::{ExperimentTracker, TrackingHook};

/// Where a returned forecast came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastSource {
    /// Read back from `07_model_output`.
    Persisted,
    /// Inference from the active registered model.
    Inference,
    /// Full pipeline run because no model was registered yet.
    Pipeline,
    /// Full pipeline run on request.
    Retrained,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub table: ForecastTable,
    pub summary: ForecastSummary,
    pub source: ForecastSource,
    pub registration: Option<RegistrationOutcome>,
}

/// Read-only view of the active model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_name: String,
    pub model_exists: bool,
    pub active: Option<ModelVersionRecord>,
    pub registered_versions: usize,
}

pub struct ForecastService {
    config: ForecastConfig,
    project_root: PathBuf,
    store: ArtifactStore,
    provider: Arc<dyn MarketDataProvider>,
    registry: Arc<ModelRegistry>,
    runner: PipelineRunner,
    run_lock: Mutex<()>,
    fixed_now: Option<DateTime<Utc>>,
}

impl ForecastService {
    /// Open the project at `project_root`: validate config, open the registry,
    /// and attach the experiment tracker when tracking is enabled.
    pub fn new(
        config: ForecastConfig,
        project_root: impl AsRef<Path>,
        provider: Arc<dyn MarketDataProvider>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let project_root = project_root.as_ref().to_path_buf();
        let data_dir = project_root.join(&config.paths.data_dir);
        let registry = ModelRegistry::open(
            data_dir.join("06_models"),
            &config.registry.model_name,
            &config.registry.description,
        )?;

        let mut runner = PipelineRunner::new();
        if config.tracking.enabled {
            let tracker = ExperimentTracker::new(
                project_root.join(&config.paths.tracking_dir),
                &config.tracking.experiment_name,
            );
            runner = runner.with_hook(Box::new(TrackingHook::new(tracker)));
        }

        info!(
            project = %project_root.display(),
            provider = provider.name(),
            model = %config.registry.model_name,
            "forecast service ready"
        );
        Ok(Self {
            store: ArtifactStore::new(data_dir),
            registry: Arc::new(registry),
            config,
            project_root,
            provider,
            runner,
            run_lock: Mutex::new(()),
            fixed_now: None,
        })
    }

    pub fn with_hook(mut self, hook: Box<dyn PipelineHook>) -> Self {
        self.runner = std::mem::take(&mut self.runner).with_hook(hook);
        self
    }

    /// Pin the clock used for ingestion windows.
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.fixed_now = Some(now);
        self
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn data_dir(&self) -> &Path {
        self.store.root()
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn available_pipelines(&self) -> Vec<&'static str> {
        PipelineName::available()
    }

    /// Latest price from the market-data provider. No pipeline involvement.
    pub fn current_price(&self, symbol: Option<&str>) -> Result<PriceQuote, PipelineError> {
        let symbol = symbol
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.config.binance.symbol);
        self.provider
            .current_price(symbol)
            .map_err(|e| PipelineError::UpstreamUnavailable(e.to_string()))
    }

    /// Run a pipeline by name. Unknown names fail before anything runs.
    pub fn run_pipeline(&self, name: &str) -> Result<RunReport, PipelineError> {
        let pipeline = PipelineName::parse(name)?;
        let guard = self.lock();
        self.run_locked(&guard, pipeline, &self.config)
    }

    /// The latest forecast, sliced to `days`.
    ///
    /// Reuses the persisted forecast when the active version produced it and it
    /// covers `days`. Otherwise runs inference, or the full pipeline when no
    /// model has been registered yet.
    pub fn latest_forecast(&self, days: Option<usize>) -> Result<ForecastResult, PipelineError> {
        let days = self.horizon(days)?;
        if let Some(result) = self.persisted_forecast(days)? {
            return Ok(result);
        }

        let guard = self.lock();
        // Another request may have produced it while we waited.
        if let Some(result) = self.persisted_forecast(days)? {
            return Ok(result);
        }
        let config = self.config_for(days);
        let (pipeline, source) = if self.registry.active_version()?.is_some() {
            (PipelineName::Inference, ForecastSource::Inference)
        } else {
            info!("no registered model, running the full pipeline");
            (PipelineName::Default, ForecastSource::Pipeline)
        };
        let report = self.run_locked(&guard, pipeline, &config)?;
        into_result(report, days, source)
    }

    /// Forecast `days` ahead, retraining first when asked.
    ///
    /// Without `retrain` the active version is used and the result is the same
    /// for the same version and horizon; with no active version this fails
    /// with `ModelNotFound`.
    pub fn generate_forecast(
        &self,
        days: Option<usize>,
        retrain: bool,
    ) -> Result<ForecastResult, PipelineError> {
        let days = self.horizon(days)?;
        let config = self.config_for(days);

        if retrain {
            let guard = self.lock();
            info!(days, "retraining before forecast");
            let report = self.run_locked(&guard, PipelineName::Default, &config)?;
            return into_result(report, days, ForecastSource::Retrained);
        }

        if self.registry.active_version()?.is_none() {
            return Err(PipelineError::ModelNotFound(format!(
                "no accepted version of '{}' is registered; request retraining first",
                self.registry.name()
            )));
        }
        let guard = self.lock();
        let report = self.run_locked(&guard, PipelineName::Inference, &config)?;
        into_result(report, days, ForecastSource::Inference)
    }

    pub fn model_info(&self) -> Result<ModelInfo, PipelineError> {
        let index = self.registry.index()?;
        let active = index.active().cloned();
        Ok(ModelInfo {
            model_name: index.model_name.clone(),
            model_exists: active.is_some(),
            active,
            registered_versions: index.versions.len(),
        })
    }

    pub fn model_versions(&self) -> Result<Vec<ModelVersionRecord>, PipelineError> {
        Ok(self.registry.versions()?)
    }

    pub fn transition_model(
        &self,
        version: u32,
        stage: Stage,
    ) -> Result<ModelVersionRecord, PipelineError> {
        Ok(self.registry.transition(version, stage)?)
    }

    // ── internals ──

    fn lock(&self) -> MutexGuard<'_, ()> {
        // A panicked run leaves nothing in memory to protect; disk state is atomic.
        self.run_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run_locked(
        &self,
        _guard: &MutexGuard<'_, ()>,
        name: PipelineName,
        config: &ForecastConfig,
    ) -> Result<RunReport, PipelineError> {
        let pipeline = name.build()?;
        let mut catalog = DataCatalog::new(self.store.clone(), Arc::clone(&self.registry));
        let now = self.fixed_now.unwrap_or_else(Utc::now);
        self.runner
            .run_at(&pipeline, &mut catalog, config, self.provider.as_ref(), now)
    }

    fn horizon(&self, days: Option<usize>) -> Result<usize, PipelineError> {
        let days = days.unwrap_or(self.config.forecast.days_ahead);
        let max = self.config.forecast.max_days_ahead;
        if days == 0 || days > max {
            return Err(PipelineError::Validation(format!(
                "days_ahead must be in 1..={max}, got {days}"
            )));
        }
        Ok(days)
    }

    fn config_for(&self, days: usize) -> ForecastConfig {
        let mut config = self.config.clone();
        config.forecast.days_ahead = days;
        config
    }

    fn persisted_forecast(&self, days: usize) -> Result<Option<ForecastResult>, PipelineError> {
        let Some(active) = self.registry.active_version()? else {
            return Ok(None);
        };
        let Some(rel) = Dataset::Forecast.path() else {
            return Ok(None);
        };
        let Some(meta) = self.store.forecast_meta(rel) else {
            return Ok(None);
        };
        if meta.model_version != active
            || meta.symbol != self.config.binance.symbol
            || meta.rows < days
        {
            return Ok(None);
        }
        let table = match self.store.read_forecast(rel) {
            Ok(table) => table,
            Err(StoreError::Missing { .. }) | Err(StoreError::Corrupt { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(table.truncated(days).map(|table| ForecastResult {
            summary: ForecastSummary::from_table(&table),
            table,
            source: ForecastSource::Persisted,
            registration: None,
        }))
    }
}

fn into_result(
    report: RunReport,
    days: usize,
    source: ForecastSource,
) -> Result<ForecastResult, PipelineError> {
    let table = report
        .forecast
        .and_then(|t| t.truncated(days))
        .ok_or_else(|| PipelineError::Storage(format!("{} produced no forecast", report.pipeline)))?;
    Ok(ForecastResult {
        summary: ForecastSummary::from_table(&table),
        table,
        source,
        registration: report.registration,
    })
}

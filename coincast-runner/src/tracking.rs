//! Experiment tracking: one JSON line per pipeline run.
//!
//! Runs are appended to `<tracking_dir>/<experiment>/runs.jsonl`. Each line is
//! independent, so a partially written line only loses that run; malformed
//! lines are skipped on read.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use coincast_core::fingerprint::config_hash;
use coincast_core::RunId;

use crate::catalog::{Artifact, DataCatalog, Dataset};
use crate::config::ForecastConfig;
use crate::runner::{HookError, PipelineHook, RunInfo, RunOutcome, RunStatus};

/// One tracked pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedRun {
    pub run_id: RunId,
    pub experiment: String,
    pub pipeline: String,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub status: RunStatus,
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    pub tags: BTreeMap<String, String>,
    pub model_version: Option<u32>,
}

pub struct ExperimentTracker {
    experiment: String,
    path: PathBuf,
}

impl ExperimentTracker {
    pub fn new(tracking_dir: impl AsRef<Path>, experiment: &str) -> Self {
        Self {
            experiment: experiment.to_string(),
            path: tracking_dir.as_ref().join(experiment).join("runs.jsonl"),
        }
    }

    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, run: &TrackedRun) -> io::Result<()> {
        let json = serde_json::to_string(run)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{json}")?;
        file.flush()
    }

    /// All tracked runs, oldest first.
    pub fn read_all(&self) -> io::Result<Vec<TrackedRun>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = io::BufReader::new(fs::File::open(&self.path)?);
        let mut runs = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TrackedRun>(&line) {
                Ok(run) => runs.push(run),
                Err(e) => debug!(error = %e, "skipping malformed tracking line"),
            }
        }
        Ok(runs)
    }
}

/// Run parameters worth recording: data window, processing and model settings,
/// plus a hash of the whole config so identical setups can be grouped.
pub fn params_from_config(config: &ForecastConfig) -> BTreeMap<String, String> {
    let hp = &config.model.hyperparameters;
    let pairs: [(&str, String); 16] = [
        ("symbol", config.binance.symbol.clone()),
        ("interval", config.binance.interval.to_string()),
        ("years_of_data", config.binance.years_of_data.to_string()),
        ("price_column", config.processing.price_column.to_string()),
        ("test_size_days", config.processing.test_size_days.to_string()),
        ("seasonality_mode", hp.seasonality_mode.as_str().to_string()),
        ("yearly_seasonality", hp.yearly_seasonality.to_string()),
        ("weekly_seasonality", hp.weekly_seasonality.to_string()),
        ("halving_cycle", hp.halving_cycle.to_string()),
        ("changepoint_prior_scale", hp.changepoint_prior_scale.to_string()),
        ("seasonality_prior_scale", hp.seasonality_prior_scale.to_string()),
        ("changepoint_range", hp.changepoint_range.to_string()),
        ("n_changepoints", hp.n_changepoints.to_string()),
        ("interval_width", hp.interval_width.to_string()),
        ("add_volume_regressor", hp.add_volume_regressor.to_string()),
        ("refit_on_full", config.model.refit_on_full.to_string()),
    ];
    let mut params: BTreeMap<String, String> = pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    match config_hash(config) {
        Ok(hash) => {
            params.insert("config_hash".to_string(), hash);
        }
        Err(e) => warn!(error = %e, "could not hash config"),
    }
    params
}

/// Pipeline hook that records every run with the tracker.
pub struct TrackingHook {
    tracker: ExperimentTracker,
}

impl TrackingHook {
    pub fn new(tracker: ExperimentTracker) -> Self {
        Self { tracker }
    }

    fn build_run(
        &self,
        run: &RunInfo<'_>,
        outcome: &RunOutcome<'_>,
        catalog: &DataCatalog,
    ) -> TrackedRun {
        let mut metrics = BTreeMap::new();
        let mut tags = BTreeMap::from([("pipeline".to_string(), run.pipeline.to_string())]);
        let mut model_version = None;

        if let Some(Artifact::Metrics(m)) = catalog.peek(Dataset::ModelMetrics) {
            for (name, value) in m.as_map() {
                metrics.insert(format!("test_{name}"), value);
            }
            metrics.insert("test_samples".to_string(), m.test_samples as f64);
        }
        if let Some(Artifact::Series(train)) = catalog.peek(Dataset::TrainSeries) {
            if let Some(stats) = train.value_stats() {
                metrics.insert("training_price_min".to_string(), stats.min);
                metrics.insert("training_price_max".to_string(), stats.max);
                metrics.insert("training_price_mean".to_string(), stats.mean);
            }
            if let (Some(first), Some(last)) = (train.first(), train.last()) {
                tags.insert(
                    "training_period".to_string(),
                    format!("{} to {}", first.date, last.date),
                );
            }
        }
        if let Some(Artifact::Series(test)) = catalog.peek(Dataset::TestSeries) {
            if let (Some(first), Some(last)) = (test.first(), test.last()) {
                tags.insert(
                    "test_period".to_string(),
                    format!("{} to {}", first.date, last.date),
                );
            }
        }
        if let Some(Artifact::Registration(registration)) = catalog.peek(Dataset::Registration) {
            let gate = if registration.decision.accepted { "passed" } else { "failed" };
            tags.insert("gate".to_string(), gate.to_string());
            model_version = registration.version();
        }

        TrackedRun {
            run_id: run.run_id.clone(),
            experiment: self.tracker.experiment().to_string(),
            pipeline: run.pipeline.to_string(),
            started_at: run.started_at,
            duration_secs: outcome.duration_secs,
            status: outcome.status.clone(),
            params: params_from_config(run.config),
            metrics,
            tags,
            model_version,
        }
    }
}

impl PipelineHook for TrackingHook {
    fn after_pipeline_run(
        &self,
        run: &RunInfo<'_>,
        outcome: &RunOutcome<'_>,
        catalog: &DataCatalog,
    ) -> Result<(), HookError> {
        let tracked = self.build_run(run, outcome, catalog);
        self.tracker.append(&tracked)?;
        debug!(run_id = %tracked.run_id, path = %self.tracker.path().display(), "tracked run");
        Ok(())
    }
}

//! Pipeline runner: executes a pipeline's nodes in order and notifies hooks.
//!
//! A node error aborts the run; nothing is retried. Hooks observe the run but
//! can never fail it: a hook error is logged and the run carries on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use coincast_core::{EvaluationMetrics, ForecastTable, MarketDataProvider, RunId};

use crate::catalog::{Artifact, DataCatalog, Dataset};
use crate::config::ForecastConfig;
use crate::error::PipelineError;
use crate::gate::RegistrationOutcome;
use crate::pipeline::{NodeContext, Pipeline};

pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Identity of the run a hook is being told about.
#[derive(Debug, Clone, Copy)]
pub struct RunInfo<'a> {
    pub run_id: &'a RunId,
    pub pipeline: &'a str,
    pub started_at: DateTime<Utc>,
    pub config: &'a ForecastConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    Finished,
    Failed { kind: String, message: String },
}

/// How a finished (or aborted) run went.
#[derive(Debug, Clone)]
pub struct RunOutcome<'a> {
    pub status: RunStatus,
    pub duration_secs: f64,
    pub nodes_executed: &'a [String],
}

/// Observer of pipeline runs.
pub trait PipelineHook: Send + Sync {
    fn before_pipeline_run(&self, _run: &RunInfo<'_>) -> Result<(), HookError> {
        Ok(())
    }

    fn after_node_run(
        &self,
        _run: &RunInfo<'_>,
        _node: &str,
        _catalog: &DataCatalog,
    ) -> Result<(), HookError> {
        Ok(())
    }

    fn after_pipeline_run(
        &self,
        _run: &RunInfo<'_>,
        _outcome: &RunOutcome<'_>,
        _catalog: &DataCatalog,
    ) -> Result<(), HookError> {
        Ok(())
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub pipeline: String,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub nodes_executed: Vec<String>,
    pub metrics: Option<EvaluationMetrics>,
    pub registration: Option<RegistrationOutcome>,
    pub forecast: Option<ForecastTable>,
}

#[derive(Default)]
pub struct PipelineRunner {
    hooks: Vec<Box<dyn PipelineHook>>,
}

static RUN_NONCE: AtomicU64 = AtomicU64::new(0);

impl PipelineRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook(mut self, hook: Box<dyn PipelineHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn run(
        &self,
        pipeline: &Pipeline,
        catalog: &mut DataCatalog,
        config: &ForecastConfig,
        provider: &dyn MarketDataProvider,
    ) -> Result<RunReport, PipelineError> {
        self.run_at(pipeline, catalog, config, provider, Utc::now())
    }

    /// Run with an explicit clock; ingestion windows end at `now`.
    pub fn run_at(
        &self,
        pipeline: &Pipeline,
        catalog: &mut DataCatalog,
        config: &ForecastConfig,
        provider: &dyn MarketDataProvider,
        now: DateTime<Utc>,
    ) -> Result<RunReport, PipelineError> {
        let run_id = RunId::generate(
            pipeline.name(),
            Utc::now(),
            RUN_NONCE.fetch_add(1, Ordering::Relaxed),
        );
        let info = RunInfo {
            run_id: &run_id,
            pipeline: pipeline.name(),
            started_at: now,
            config,
        };
        info!(run_id = %run_id, pipeline = pipeline.name(), nodes = pipeline.len(), "pipeline started");
        for hook in &self.hooks {
            if let Err(e) = hook.before_pipeline_run(&info) {
                warn!(error = %e, "hook before_pipeline_run failed");
            }
        }

        let clock = Instant::now();
        let mut executed: Vec<String> = Vec::with_capacity(pipeline.len());
        let mut failure = None;

        for node in pipeline.nodes() {
            info!(node = node.name(), "node started");
            let node_clock = Instant::now();
            let mut ctx = NodeContext {
                catalog: &mut *catalog,
                config,
                provider,
                run_id: &run_id,
                now,
            };
            if let Err(e) = node.run(&mut ctx) {
                error!(node = node.name(), kind = %e.kind(), error = %e, "node failed");
                failure = Some(e);
                break;
            }
            info!(
                node = node.name(),
                elapsed_ms = node_clock.elapsed().as_millis() as u64,
                "node finished"
            );
            executed.push(node.name().to_string());
            for hook in &self.hooks {
                if let Err(e) = hook.after_node_run(&info, node.name(), catalog) {
                    warn!(node = node.name(), error = %e, "hook after_node_run failed");
                }
            }
        }

        let duration_secs = clock.elapsed().as_secs_f64();
        let outcome = RunOutcome {
            status: match &failure {
                None => RunStatus::Finished,
                Some(e) => RunStatus::Failed {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                },
            },
            duration_secs,
            nodes_executed: &executed,
        };
        for hook in &self.hooks {
            if let Err(e) = hook.after_pipeline_run(&info, &outcome, catalog) {
                warn!(error = %e, "hook after_pipeline_run failed");
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }
        info!(run_id = %run_id, pipeline = pipeline.name(), duration_secs, "pipeline finished");

        let produced = pipeline.outputs();
        let catalog: &DataCatalog = catalog;
        let produced_here = move |d: Dataset| {
            if produced.contains(&d) {
                catalog.peek(d)
            } else {
                None
            }
        };
        Ok(RunReport {
            run_id: run_id.clone(),
            pipeline: pipeline.name().to_string(),
            started_at: now,
            duration_secs,
            nodes_executed: executed,
            metrics: match produced_here(Dataset::ModelMetrics) {
                Some(Artifact::Metrics(m)) => Some(m.clone()),
                _ => None,
            },
            registration: match produced_here(Dataset::Registration) {
                Some(Artifact::Registration(r)) => Some(r.as_ref().clone()),
                _ => None,
            },
            forecast: match produced_here(Dataset::Forecast) {
                Some(Artifact::Forecast(f)) => Some(f.clone()),
                _ => None,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Node;
    use crate::registry::ModelRegistry;
    use coincast_core::{ArtifactStore, SyntheticProvider};
    use std::sync::{Arc, Mutex};

    struct Fails;

    impl Node for Fails {
        fn name(&self) -> &'static str {
            "fails"
        }
        fn inputs(&self) -> &'static [Dataset] {
            &[]
        }
        fn outputs(&self) -> &'static [Dataset] {
            &[]
        }
        fn run(&self, _ctx: &mut NodeContext<'_>) -> Result<(), PipelineError> {
            Err(PipelineError::Validation("boom".into()))
        }
    }

    struct Passes;

    impl Node for Passes {
        fn name(&self) -> &'static str {
            "ok"
        }
        fn inputs(&self) -> &'static [Dataset] {
            &[]
        }
        fn outputs(&self) -> &'static [Dataset] {
            &[]
        }
        fn run(&self, _ctx: &mut NodeContext<'_>) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl PipelineHook for Recorder {
        fn before_pipeline_run(&self, run: &RunInfo<'_>) -> Result<(), HookError> {
            self.events.lock().unwrap().push(format!("start:{}", run.pipeline));
            Err("tracker offline".into())
        }

        fn after_node_run(
            &self,
            _run: &RunInfo<'_>,
            node: &str,
            _catalog: &DataCatalog,
        ) -> Result<(), HookError> {
            self.events.lock().unwrap().push(format!("node:{node}"));
            Ok(())
        }

        fn after_pipeline_run(
            &self,
            _run: &RunInfo<'_>,
            outcome: &RunOutcome<'_>,
            _catalog: &DataCatalog,
        ) -> Result<(), HookError> {
            let status = match &outcome.status {
                RunStatus::Finished => "finished".to_string(),
                RunStatus::Failed { kind, .. } => format!("failed:{kind}"),
            };
            self.events.lock().unwrap().push(status);
            Ok(())
        }
    }

    fn catalog(dir: &std::path::Path) -> DataCatalog {
        let registry = ModelRegistry::open(dir.join("06_models"), "btc", "test").unwrap();
        DataCatalog::new(ArtifactStore::new(dir), Arc::new(registry))
    }

    #[test]
    fn failing_node_aborts_and_hooks_see_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = catalog(dir.path());
        let events = Arc::new(Mutex::new(Vec::new()));
        let runner = PipelineRunner::new().with_hook(Box::new(Recorder {
            events: events.clone(),
        }));
        let pipeline = Pipeline::new("p", vec![Box::new(Passes), Box::new(Fails)]).unwrap();

        let err = runner
            .run(
                &pipeline,
                &mut catalog,
                &ForecastConfig::default(),
                &SyntheticProvider::new(),
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(
            *events.lock().unwrap(),
            vec!["start:p", "node:ok", "failed:ValidationError"]
        );
    }

    #[test]
    fn hook_errors_do_not_fail_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = catalog(dir.path());
        let runner = PipelineRunner::new().with_hook(Box::<Recorder>::default());
        let pipeline = Pipeline::new("p", vec![Box::new(Passes)]).unwrap();

        let report = runner
            .run(
                &pipeline,
                &mut catalog,
                &ForecastConfig::default(),
                &SyntheticProvider::new(),
            )
            .unwrap();
        assert_eq!(report.nodes_executed, vec!["ok"]);
        assert!(report.metrics.is_none());
        assert!(report.forecast.is_none());
        assert_eq!(report.run_id.0.len(), 32);
    }
}

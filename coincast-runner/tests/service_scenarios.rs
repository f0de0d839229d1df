//! Service-level scenarios against the synthetic provider, one temp project per test.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use coincast_core::{
    Candle, DataError, KlineRequest, MarketDataProvider, PriceQuote, SyntheticProvider,
};
use coincast_runner::{
    DeploymentThresholds, ErrorKind, ExperimentTracker, ForecastConfig, ForecastService,
    ForecastSource, PipelineError, RunStatus, Stage,
};

fn clock() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

/// Thresholds loose enough that synthetic runs always pass the gate.
fn config() -> ForecastConfig {
    let mut config = ForecastConfig::default();
    config.deployment = DeploymentThresholds {
        min_r2: -1_000.0,
        max_mape: 100.0,
    };
    config
}

fn service(dir: &std::path::Path, config: ForecastConfig) -> ForecastService {
    ForecastService::new(config, dir, Arc::new(SyntheticProvider::new()))
        .unwrap()
        .with_clock(clock())
}

/// Counts every call, then delegates or fails.
struct CountingProvider {
    calls: AtomicUsize,
    fail: bool,
}

impl CountingProvider {
    fn new(fail: bool) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail,
        }
    }
}

impl MarketDataProvider for CountingProvider {
    fn name(&self) -> &str {
        "counting"
    }

    fn fetch_klines(&self, request: &KlineRequest) -> Result<Vec<Candle>, DataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DataError::NetworkUnreachable("connection refused".into()));
        }
        SyntheticProvider::new().fetch_klines(request)
    }

    fn current_price(&self, symbol: &str) -> Result<PriceQuote, DataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DataError::NetworkUnreachable("connection refused".into()));
        }
        SyntheticProvider::new().current_price(symbol)
    }
}

#[test]
fn default_pipeline_trains_registers_and_forecasts() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path(), config());

    let report = service.run_pipeline("__default__").unwrap();
    assert_eq!(report.nodes_executed.len(), 11);
    assert_eq!(report.nodes_executed.first().map(String::as_str), Some("fetch_candles"));

    let registration = report.registration.unwrap();
    assert!(registration.decision.accepted);
    let record = registration.registered.unwrap();
    assert_eq!(record.version, 1);
    assert_eq!(record.stage, Stage::Production);
    // Two years of daily candles; evaluated on 30 held out, then refit on all of them.
    assert_eq!(record.n_train, 731);
    assert_eq!(record.metrics.test_samples, 30);

    let forecast = report.forecast.unwrap();
    assert_eq!(forecast.horizon(), 30);
    assert!(forecast.is_contiguous());
    assert_eq!(forecast.last_training_date, record.training_end);
    assert_eq!(record.training_end, clock().date_naive());

    let data = dir.path().join("data");
    for rel in [
        "01_raw/candles.parquet",
        "02_intermediate/candles_validated.parquet",
        "03_primary/price_series.parquet",
        "04_feature/price_series_full.parquet",
        "05_model_input/train.parquet",
        "05_model_input/test.parquet",
        "06_models/registry/btc_price_forecaster/index.json",
        "06_models/registry/btc_price_forecaster/v1/model.json",
        "07_model_output/forecast.parquet",
        "08_reporting/model_report.json",
        "08_reporting/forecast_summary.json",
        "08_reporting/forecast.csv",
    ] {
        assert!(data.join(rel).exists(), "missing {rel}");
    }

    let runs = ExperimentTracker::new(dir.path().join("mlruns"), "crypto_forecasting")
        .read_all()
        .unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Finished);
    assert_eq!(runs[0].model_version, Some(1));
    assert_eq!(runs[0].tags["gate"], "passed");
    assert!(runs[0].metrics.contains_key("test_mape"));
    assert!(runs[0].metrics.contains_key("training_price_mean"));
}

#[test]
fn seven_day_forecast_from_existing_model() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path(), config());
    service.run_pipeline("__default__").unwrap();
    let info = service.model_info().unwrap();
    let last_training = info.active.unwrap().training_end;

    let result = service.generate_forecast(Some(7), false).unwrap();
    assert_eq!(result.source, ForecastSource::Inference);
    assert_eq!(result.table.points.len(), 7);
    for (i, point) in result.table.points.iter().enumerate() {
        assert_eq!(point.date, last_training + Duration::days(i as i64 + 1));
        assert!(point.lower_bound <= point.predicted_price);
        assert!(point.predicted_price <= point.upper_bound);
    }
    assert_eq!(result.summary.forecast_days, 7);

    // Same version, same horizon: same answer.
    let again = service.generate_forecast(Some(7), false).unwrap();
    assert_eq!(again.table, result.table);
}

#[test]
fn unknown_pipeline_runs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(CountingProvider::new(false));
    let service = ForecastService::new(config(), dir.path(), provider.clone()).unwrap();

    let err = service.run_pipeline("bogus").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownPipelineError);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join("data/01_raw").exists());
    assert!(!dir.path().join("mlruns").exists());
}

#[test]
fn forecast_read_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path(), config());

    // Nothing registered yet: the read path runs the whole pipeline.
    let first = service.latest_forecast(Some(14)).unwrap();
    assert_eq!(first.source, ForecastSource::Pipeline);
    assert_eq!(first.table.points.len(), 14);

    let second = service.latest_forecast(Some(14)).unwrap();
    assert_eq!(second.source, ForecastSource::Persisted);
    assert_eq!(second.table, first.table);

    // A shorter horizon is a prefix of the persisted table.
    let shorter = service.latest_forecast(Some(3)).unwrap();
    assert_eq!(shorter.source, ForecastSource::Persisted);
    assert_eq!(shorter.table.points[..], first.table.points[..3]);

    // A longer one needs fresh inference from the same version.
    let longer = service.latest_forecast(Some(60)).unwrap();
    assert_eq!(longer.source, ForecastSource::Inference);
    assert_eq!(longer.table.points[..14], first.table.points[..]);
}

#[test]
fn strict_gate_rejects_and_registers_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut strict = config();
    strict.deployment = DeploymentThresholds {
        min_r2: 0.999_999,
        max_mape: 1e-6,
    };
    let service = service(dir.path(), strict);

    service.run_pipeline("data_ingestion").unwrap();
    service.run_pipeline("data_processing").unwrap();
    let report = service.run_pipeline("model_training").unwrap();

    let registration = report.registration.unwrap();
    assert!(!registration.decision.accepted);
    assert_eq!(registration.decision.failures.len(), 2);
    assert!(registration.registered.is_none());
    assert!(service.registry().versions().unwrap().is_empty());
    assert!(!service.model_info().unwrap().model_exists);

    let err = service.generate_forecast(Some(7), false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModelNotFoundError);

    let runs = ExperimentTracker::new(dir.path().join("mlruns"), "crypto_forecasting")
        .read_all()
        .unwrap();
    assert_eq!(runs.last().unwrap().tags["gate"], "failed");
}

#[test]
fn retrain_registers_a_new_active_version() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path(), config());

    let first = service.generate_forecast(Some(5), true).unwrap();
    assert_eq!(first.source, ForecastSource::Retrained);
    assert_eq!(first.registration.as_ref().and_then(|r| r.version()), Some(1));

    let second = service.generate_forecast(Some(5), true).unwrap();
    assert_eq!(second.table.model_version, 2);

    let versions = service.model_versions().unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].stage, Stage::None);
    assert_eq!(versions[1].stage, Stage::Production);
    assert_eq!(service.model_info().unwrap().active.unwrap().version, 2);
}

#[test]
fn concurrent_retrains_are_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path(), config());

    std::thread::scope(|s| {
        for _ in 0..2 {
            s.spawn(|| service.generate_forecast(Some(3), true).unwrap());
        }
    });

    let versions = service.model_versions().unwrap();
    let mut numbers: Vec<u32> = versions.iter().map(|r| r.version).collect();
    numbers.sort_unstable();
    assert_eq!(numbers, vec![1, 2]);
    assert_eq!(
        versions.iter().filter(|r| r.stage == Stage::Production).count(),
        1
    );
}

#[test]
fn forecast_without_model_or_retrain_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path(), config());
    let err = service.generate_forecast(Some(7), false).unwrap_err();
    assert!(matches!(err, PipelineError::ModelNotFound(_)));
}

#[test]
fn horizon_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path(), config());
    for days in [0, 366] {
        let err = service.generate_forecast(Some(days), false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError, "days = {days}");
        let err = service.latest_forecast(Some(days)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError, "days = {days}");
    }
}

#[test]
fn current_price_failure_is_upstream_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let down = ForecastService::new(config(), dir.path(), Arc::new(CountingProvider::new(true))).unwrap();
    let err = down.current_price(Some("BTCUSDT")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);

    let up = service(dir.path(), config());
    let quote = up.current_price(None).unwrap();
    assert_eq!(quote.symbol, "BTCUSDT");
    assert!(quote.price > 0.0);
}

#[test]
fn ingestion_failure_aborts_run_and_is_tracked() {
    let dir = tempfile::tempdir().unwrap();
    let service =
        ForecastService::new(config(), dir.path(), Arc::new(CountingProvider::new(true))).unwrap();

    let err = service.run_pipeline("__default__").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataSourceError);
    assert!(!dir.path().join("data/02_intermediate").exists());

    let runs = ExperimentTracker::new(dir.path().join("mlruns"), "crypto_forecasting")
        .read_all()
        .unwrap();
    assert!(matches!(
        &runs[0].status,
        RunStatus::Failed { kind, .. } if kind == "DataSourceError"
    ));
}

#[test]
fn without_refit_forecasts_start_at_the_train_partition_end() {
    let dir = tempfile::tempdir().unwrap();
    let mut holdout_only = config();
    holdout_only.model.refit_on_full = false;
    let service = service(dir.path(), holdout_only);

    let report = service.run_pipeline("__default__").unwrap();
    let record = report.registration.unwrap().registered.unwrap();
    assert_eq!(record.n_train, 731 - 30);
    assert_eq!(record.metrics.test_samples, 30);
    let forecast = report.forecast.unwrap();
    assert_eq!(forecast.last_training_date, record.training_end);
    assert_eq!(record.training_end, clock().date_naive() - Duration::days(30));
}

//! Coincast core: everything a forecasting run needs that is not orchestration.
//!
//! - Domain types (candles, time series frames, forecast tables, ids)
//! - Market-data providers (exchange client, synthetic generator) and paginated ingestion
//! - Processing: frame construction, volume feature, train/test split
//! - The decomposable forecasting model and holdout metrics
//! - Parquet/JSON artifact store and content fingerprints

pub mod data;
pub mod domain;
pub mod fingerprint;
pub mod metrics;
pub mod model;
pub mod processing;

pub use data::{
    fetch_candles, validate_candles, ArtifactStore, BinanceProvider, DataError, IngestRequest,
    Interval, KlineRequest, MarketDataProvider, PriceQuote, StoreError, SyntheticProvider,
};
pub use domain::{
    Candle, CandleSeries, DatasetHash, ForecastPoint, ForecastTable, Observation, PriceField,
    RunId, TimeSeriesFrame,
};
pub use metrics::{evaluate, EvaluationMetrics};
pub use model::{DecomposableModel, Hyperparameters, ModelError, Prediction, SeasonalityMode};
pub use processing::{add_volume_feature, build_frame, split_train_test, ProcessError, TrainTestSplit};

//! Parquet/JSON artifact store rooted at the project data directory.
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - Metadata sidecar next to each table (`{name}.meta.json`, content hash)
//! - Integrity validation on load (schema check, row count > 0)
//! - Quarantine for corrupt tables (`{name}.parquet.quarantined`)

use super::interval::Interval;
use crate::domain::{
    Candle, CandleSeries, ForecastPoint, ForecastTable, Observation, TimeSeriesFrame,
};
use crate::fingerprint;
use chrono::{DateTime, NaiveDate, Utc};
use polars::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("artifact not found: {}", path.display())]
    Missing { path: PathBuf },

    #[error("corrupt artifact {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("json error: {0}")]
    Json(String),
}

/// Sidecar for a persisted candle table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleMeta {
    pub symbol: String,
    pub interval: Interval,
    pub rows: usize,
    pub data_hash: String,
    pub written_at: DateTime<Utc>,
}

/// Sidecar for a persisted forecast table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMeta {
    pub model_version: u32,
    pub symbol: String,
    pub last_training_date: NaiveDate,
    pub last_training_value: f64,
    pub rows: usize,
    pub written_at: DateTime<Utc>,
}

const CANDLE_COLUMNS: [&str; 9] = [
    "open_time",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "close_time",
    "quote_volume",
    "trades",
];
const SERIES_COLUMNS: [&str; 3] = ["date", "value", "volume"];
const FORECAST_COLUMNS: [&str; 5] = [
    "date",
    "predicted_price",
    "lower_bound",
    "upper_bound",
    "trend",
];

/// Artifact store. Paths passed to it are relative to `root`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.root.join(rel)
    }

    pub fn exists(&self, rel: impl AsRef<Path>) -> bool {
        self.path(rel).exists()
    }

    fn meta_path(path: &Path) -> PathBuf {
        path.with_extension("meta.json")
    }

    // ── Candles ──

    pub fn write_candles(&self, rel: impl AsRef<Path>, series: &CandleSeries) -> Result<(), StoreError> {
        let path = self.path(rel);
        let df = candles_to_dataframe(&series.candles)?;
        write_parquet_atomic(&df, &path)?;

        let meta = CandleMeta {
            symbol: series.symbol.clone(),
            interval: series.interval,
            rows: series.len(),
            data_hash: fingerprint::candles_hash(series).0,
            written_at: Utc::now(),
        };
        write_json_atomic(&Self::meta_path(&path), &meta)
    }

    pub fn read_candles(&self, rel: impl AsRef<Path>) -> Result<CandleSeries, StoreError> {
        let path = self.path(rel);
        let meta: CandleMeta = read_json(&Self::meta_path(&path))?;
        let df = load_and_validate(&path, &CANDLE_COLUMNS)?;
        let candles = dataframe_to_candles(&df)?;
        Ok(CandleSeries::new(meta.symbol, meta.interval, candles))
    }

    pub fn candle_meta(&self, rel: impl AsRef<Path>) -> Option<CandleMeta> {
        read_json(&Self::meta_path(&self.path(rel))).ok()
    }

    // ── Time series frames ──

    pub fn write_series(&self, rel: impl AsRef<Path>, frame: &TimeSeriesFrame) -> Result<(), StoreError> {
        let df = series_to_dataframe(frame)?;
        write_parquet_atomic(&df, &self.path(rel))
    }

    pub fn read_series(&self, rel: impl AsRef<Path>) -> Result<TimeSeriesFrame, StoreError> {
        let path = self.path(rel);
        let df = load_and_validate(&path, &SERIES_COLUMNS)?;
        let observations = dataframe_to_observations(&df)?;
        TimeSeriesFrame::new(observations).map_err(|e| StoreError::Corrupt {
            path,
            reason: e.to_string(),
        })
    }

    // ── Forecasts ──

    pub fn write_forecast(&self, rel: impl AsRef<Path>, table: &ForecastTable) -> Result<(), StoreError> {
        let path = self.path(rel);
        let df = forecast_to_dataframe(&table.points)?;
        write_parquet_atomic(&df, &path)?;

        let meta = ForecastMeta {
            model_version: table.model_version,
            symbol: table.symbol.clone(),
            last_training_date: table.last_training_date,
            last_training_value: table.last_training_value,
            rows: table.points.len(),
            written_at: Utc::now(),
        };
        write_json_atomic(&Self::meta_path(&path), &meta)
    }

    pub fn read_forecast(&self, rel: impl AsRef<Path>) -> Result<ForecastTable, StoreError> {
        let path = self.path(rel);
        let meta: ForecastMeta = read_json(&Self::meta_path(&path))?;
        let df = load_and_validate(&path, &FORECAST_COLUMNS)?;
        let points = dataframe_to_forecast(&df)?;
        if points.len() != meta.rows {
            return Err(StoreError::Corrupt {
                path,
                reason: format!("sidecar says {} rows, table has {}", meta.rows, points.len()),
            });
        }
        Ok(ForecastTable {
            model_version: meta.model_version,
            symbol: meta.symbol,
            last_training_date: meta.last_training_date,
            last_training_value: meta.last_training_value,
            points,
        })
    }

    /// Forecast sidecar only, without loading the table.
    pub fn forecast_meta(&self, rel: impl AsRef<Path>) -> Option<ForecastMeta> {
        read_json(&Self::meta_path(&self.path(rel))).ok()
    }

    // ── JSON documents ──

    pub fn write_json<T: Serialize>(&self, rel: impl AsRef<Path>, value: &T) -> Result<(), StoreError> {
        write_json_atomic(&self.path(rel), value)
    }

    pub fn read_json<T: DeserializeOwned>(&self, rel: impl AsRef<Path>) -> Result<T, StoreError> {
        read_json(&self.path(rel))
    }
}

// ── Atomic file helpers ─────────────────────────────────────────────

fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

fn rename_into_place(tmp: &Path, path: &Path) -> Result<(), StoreError> {
    fs::rename(tmp, path).map_err(|source| {
        let _ = fs::remove_file(tmp);
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Write bytes to `path` through a sibling `.tmp` file.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    ensure_parent(path)?;
    let tmp = tmp_path(path);
    fs::write(&tmp, bytes).map_err(|source| StoreError::Io {
        path: tmp.clone(),
        source,
    })?;
    rename_into_place(&tmp, path)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Json(e.to_string()))?;
    write_bytes_atomic(path, &json)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::Missing {
                path: path.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn write_parquet_atomic(df: &DataFrame, path: &Path) -> Result<(), StoreError> {
    ensure_parent(path)?;
    let tmp = tmp_path(path);
    let file = fs::File::create(&tmp).map_err(|source| StoreError::Io {
        path: tmp.clone(),
        source,
    })?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| StoreError::Parquet(format!("write {}: {e}", path.display())))?;
    rename_into_place(&tmp, path)
}

/// Load a parquet table and validate it; corrupt files are quarantined.
fn load_and_validate(path: &Path, expected: &[&str]) -> Result<DataFrame, StoreError> {
    if !path.exists() {
        return Err(StoreError::Missing {
            path: path.to_path_buf(),
        });
    }

    match read_parquet(path, expected) {
        Ok(df) => Ok(df),
        Err(reason) => {
            let mut quarantined = path.as_os_str().to_os_string();
            quarantined.push(".quarantined");
            warn!(path = %path.display(), %reason, "quarantining corrupt artifact");
            let _ = fs::rename(path, PathBuf::from(quarantined));
            Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                reason,
            })
        }
    }
}

fn read_parquet(path: &Path, expected: &[&str]) -> Result<DataFrame, String> {
    let file = fs::File::open(path).map_err(|e| format!("open: {e}"))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| format!("read: {e}"))?;

    if df.height() == 0 {
        return Err("empty parquet file".into());
    }
    for col_name in expected {
        if df.column(col_name).is_err() {
            return Err(format!("missing column '{col_name}'"));
        }
    }
    Ok(df)
}

// ── DataFrame conversions ───────────────────────────────────────────

fn epoch() -> NaiveDate {
    NaiveDate::default()
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    (date - epoch()).num_days() as i32
}

fn parquet_err(context: &str) -> impl Fn(PolarsError) -> StoreError + '_ {
    move |e| StoreError::Parquet(format!("{context}: {e}"))
}

fn date_column(name: &str, dates: Vec<i32>) -> Result<Column, StoreError> {
    Column::new(name.into(), dates)
        .cast(&DataType::Date)
        .map_err(parquet_err("date cast"))
}

fn candles_to_dataframe(candles: &[Candle]) -> Result<DataFrame, StoreError> {
    let open_times: Vec<i64> = candles.iter().map(|c| c.open_time.timestamp_millis()).collect();
    let close_times: Vec<i64> = candles.iter().map(|c| c.close_time.timestamp_millis()).collect();
    let field = |f: fn(&Candle) -> f64| -> Vec<f64> { candles.iter().map(f).collect() };
    let trades: Vec<u64> = candles.iter().map(|c| c.trades).collect();

    DataFrame::new(vec![
        Column::new("open_time".into(), open_times),
        Column::new("open".into(), field(|c| c.open)),
        Column::new("high".into(), field(|c| c.high)),
        Column::new("low".into(), field(|c| c.low)),
        Column::new("close".into(), field(|c| c.close)),
        Column::new("volume".into(), field(|c| c.volume)),
        Column::new("close_time".into(), close_times),
        Column::new("quote_volume".into(), field(|c| c.quote_volume)),
        Column::new("trades".into(), trades),
    ])
    .map_err(parquet_err("candle dataframe"))
}

fn dataframe_to_candles(df: &DataFrame) -> Result<Vec<Candle>, StoreError> {
    let col = |name: &str| df.column(name).map_err(parquet_err("column read"));
    let f64_col = |name: &str| -> Result<Float64Chunked, StoreError> {
        Ok(col(name)?.f64().map_err(parquet_err(name))?.clone())
    };

    let open_time = col("open_time")?.i64().map_err(parquet_err("open_time"))?.clone();
    let close_time = col("close_time")?.i64().map_err(parquet_err("close_time"))?.clone();
    let trades = col("trades")?.u64().map_err(parquet_err("trades"))?.clone();
    let open = f64_col("open")?;
    let high = f64_col("high")?;
    let low = f64_col("low")?;
    let close = f64_col("close")?;
    let volume = f64_col("volume")?;
    let quote_volume = f64_col("quote_volume")?;

    let timestamp = |ms: Option<i64>, row: usize| {
        ms.and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or_else(|| StoreError::Parquet(format!("null or invalid timestamp at row {row}")))
    };

    (0..df.height())
        .map(|i| {
            Ok(Candle {
                open_time: timestamp(open_time.get(i), i)?,
                open: open.get(i).unwrap_or(f64::NAN),
                high: high.get(i).unwrap_or(f64::NAN),
                low: low.get(i).unwrap_or(f64::NAN),
                close: close.get(i).unwrap_or(f64::NAN),
                volume: volume.get(i).unwrap_or(f64::NAN),
                close_time: timestamp(close_time.get(i), i)?,
                quote_volume: quote_volume.get(i).unwrap_or(f64::NAN),
                trades: trades.get(i).unwrap_or(0),
            })
        })
        .collect()
}

fn series_to_dataframe(frame: &TimeSeriesFrame) -> Result<DataFrame, StoreError> {
    let obs = frame.observations();
    let dates: Vec<i32> = obs.iter().map(|o| days_since_epoch(o.date)).collect();
    let values: Vec<f64> = obs.iter().map(|o| o.value).collect();
    let volumes: Vec<Option<f64>> = obs.iter().map(|o| o.volume).collect();

    DataFrame::new(vec![
        date_column("date", dates)?,
        Column::new("value".into(), values),
        Column::new("volume".into(), volumes),
    ])
    .map_err(parquet_err("series dataframe"))
}

fn read_dates(df: &DataFrame) -> Result<Vec<NaiveDate>, StoreError> {
    let dates = df.column("date").map_err(parquet_err("column read"))?;
    let date_ca = dates.date().map_err(parquet_err("date column type"))?;
    (0..df.height())
        .map(|i| {
            date_ca
                .get(i)
                .map(|days| epoch() + chrono::Duration::days(days as i64))
                .ok_or_else(|| StoreError::Parquet(format!("null date at row {i}")))
        })
        .collect()
}

fn dataframe_to_observations(df: &DataFrame) -> Result<Vec<Observation>, StoreError> {
    let dates = read_dates(df)?;
    let values = df
        .column("value")
        .map_err(parquet_err("column read"))?
        .f64()
        .map_err(parquet_err("value"))?
        .clone();
    let volumes = df
        .column("volume")
        .map_err(parquet_err("column read"))?
        .f64()
        .map_err(parquet_err("volume"))?
        .clone();

    Ok(dates
        .into_iter()
        .enumerate()
        .map(|(i, date)| Observation {
            date,
            value: values.get(i).unwrap_or(f64::NAN),
            volume: volumes.get(i),
        })
        .collect())
}

fn forecast_to_dataframe(points: &[ForecastPoint]) -> Result<DataFrame, StoreError> {
    let dates: Vec<i32> = points.iter().map(|p| days_since_epoch(p.date)).collect();
    let field = |f: fn(&ForecastPoint) -> f64| -> Vec<f64> { points.iter().map(f).collect() };

    DataFrame::new(vec![
        date_column("date", dates)?,
        Column::new("predicted_price".into(), field(|p| p.predicted_price)),
        Column::new("lower_bound".into(), field(|p| p.lower_bound)),
        Column::new("upper_bound".into(), field(|p| p.upper_bound)),
        Column::new("trend".into(), field(|p| p.trend)),
    ])
    .map_err(parquet_err("forecast dataframe"))
}

fn dataframe_to_forecast(df: &DataFrame) -> Result<Vec<ForecastPoint>, StoreError> {
    let dates = read_dates(df)?;
    let f64_col = |name: &str| -> Result<Float64Chunked, StoreError> {
        Ok(df
            .column(name)
            .map_err(parquet_err("column read"))?
            .f64()
            .map_err(parquet_err(name))?
            .clone())
    };
    let predicted = f64_col("predicted_price")?;
    let lower = f64_col("lower_bound")?;
    let upper = f64_col("upper_bound")?;
    let trend = f64_col("trend")?;

    Ok(dates
        .into_iter()
        .enumerate()
        .map(|(i, date)| ForecastPoint {
            date,
            predicted_price: predicted.get(i).unwrap_or(f64::NAN),
            lower_bound: lower.get(i).unwrap_or(f64::NAN),
            upper_bound: upper.get(i).unwrap_or(f64::NAN),
            trend: trend.get(i).unwrap_or(f64::NAN),
        })
        .collect())
}

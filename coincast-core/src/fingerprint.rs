//! Content fingerprints: deterministic BLAKE3 hashes of datasets and configs.
//!
//! A fitted model records the fingerprint of the frame it was trained on, so a
//! registry entry can always be traced back to the exact training data.

use crate::domain::{CandleSeries, DatasetHash, TimeSeriesFrame};
use serde::Serialize;

/// Hash of a candle series: symbol, interval, then every field in order.
pub fn candles_hash(series: &CandleSeries) -> DatasetHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(series.symbol.as_bytes());
    hasher.update(series.interval.as_str().as_bytes());
    for c in &series.candles {
        hasher.update(&c.open_time.timestamp_millis().to_le_bytes());
        hasher.update(&c.open.to_le_bytes());
        hasher.update(&c.high.to_le_bytes());
        hasher.update(&c.low.to_le_bytes());
        hasher.update(&c.close.to_le_bytes());
        hasher.update(&c.volume.to_le_bytes());
        hasher.update(&c.close_time.timestamp_millis().to_le_bytes());
        hasher.update(&c.quote_volume.to_le_bytes());
        hasher.update(&c.trades.to_le_bytes());
    }
    DatasetHash(hasher.finalize().to_hex().to_string())
}

/// Hash of a time series frame (dates, values, volumes).
pub fn frame_hash(frame: &TimeSeriesFrame) -> DatasetHash {
    let mut hasher = blake3::Hasher::new();
    for obs in frame.observations() {
        hasher.update(obs.date.to_string().as_bytes());
        hasher.update(&obs.value.to_le_bytes());
        match obs.volume {
            Some(v) => hasher.update(&v.to_le_bytes()),
            None => hasher.update(b"-"),
        };
    }
    DatasetHash(hasher.finalize().to_hex().to_string())
}

/// Hash of any serializable config. Use `BTreeMap`s inside for stable key order.
pub fn config_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(value)?;
    Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
}

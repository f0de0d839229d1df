//! Candle series → validated time series frame → train/test split.

use crate::domain::{CandleSeries, Observation, PriceField, TimeSeriesFrame};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq)]
pub enum ProcessError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Volumes at or below zero are replaced by this value in the feature frame.
pub const VOLUME_FLOOR: f64 = 1.0;

/// A frame partitioned at a fixed offset from the end.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainTestSplit {
    pub train: TimeSeriesFrame,
    pub test: TimeSeriesFrame,
}

/// Build the date/value frame from one price column.
///
/// Rows whose value is NaN or not positive are dropped. Sub-daily candles
/// collapse to one row per calendar date, keeping the last one. Fails with
/// `Validation` when fewer than `min_observations` rows remain.
pub fn build_frame(
    candles: &CandleSeries,
    field: PriceField,
    min_observations: usize,
) -> Result<TimeSeriesFrame, ProcessError> {
    let mut by_date = BTreeMap::new();
    let mut dropped = 0usize;
    for candle in &candles.candles {
        let value = candle.price(field);
        if !value.is_finite() || value <= 0.0 {
            dropped += 1;
            continue;
        }
        by_date.insert(candle.date(), value);
    }
    if dropped > 0 {
        debug!(symbol = %candles.symbol, dropped, "dropped rows with missing or non-positive values");
    }

    let observations: Vec<Observation> = by_date
        .into_iter()
        .map(|(date, value)| Observation::new(date, value))
        .collect();

    if observations.len() < min_observations {
        return Err(ProcessError::Validation(format!(
            "frame has {} observations, at least {min_observations} required",
            observations.len()
        )));
    }

    let frame =
        TimeSeriesFrame::new(observations).map_err(|e| ProcessError::Validation(e.to_string()))?;
    info!(
        symbol = %candles.symbol,
        column = %field,
        rows = frame.len(),
        "built time series frame"
    );
    Ok(frame)
}

/// Attach each date's volume from the candles as a regressor column.
///
/// Missing, NaN, or non-positive volumes become `VOLUME_FLOOR`.
pub fn add_volume_feature(
    frame: &TimeSeriesFrame,
    candles: &CandleSeries,
) -> Result<TimeSeriesFrame, ProcessError> {
    let volume_by_date: BTreeMap<_, _> = candles
        .candles
        .iter()
        .map(|c| (c.date(), c.volume))
        .collect();

    let observations = frame
        .observations()
        .iter()
        .map(|obs| {
            let volume = volume_by_date
                .get(&obs.date)
                .copied()
                .filter(|v| v.is_finite() && *v > 0.0)
                .unwrap_or(VOLUME_FLOOR);
            Observation {
                volume: Some(volume),
                ..*obs
            }
        })
        .collect();

    TimeSeriesFrame::new(observations).map_err(|e| ProcessError::Validation(e.to_string()))
}

/// Split off the last `test_days` rows as the test partition.
///
/// Fails with `Configuration` when `test_days` is zero or not smaller than the
/// frame, since either would leave one side empty.
pub fn split_train_test(
    frame: &TimeSeriesFrame,
    test_days: usize,
) -> Result<TrainTestSplit, ProcessError> {
    if test_days == 0 {
        return Err(ProcessError::Configuration(
            "test_size_days must be at least 1".into(),
        ));
    }
    if test_days >= frame.len() {
        return Err(ProcessError::Configuration(format!(
            "test_size_days ({test_days}) must be smaller than the frame ({} rows)",
            frame.len()
        )));
    }

    let (train, test) = frame.split_at(frame.len() - test_days);
    info!(
        train = train.len(),
        test = test.len(),
        "split frame into train/test"
    );
    Ok(TrainTestSplit { train, test })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Interval;
    use crate::domain::Candle;
    use chrono::{Duration, TimeZone, Utc};

    fn candles(closes: &[f64]) -> CandleSeries {
        let t0 = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let rows = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let open_time = t0 + Duration::days(i as i64);
                Candle {
                    open_time,
                    open: 10.0,
                    high: 12.0,
                    low: 9.0,
                    close,
                    volume: i as f64,
                    close_time: open_time + Duration::milliseconds(86_399_999),
                    quote_volume: 0.0,
                    trades: 1,
                }
            })
            .collect();
        CandleSeries::new("BTCUSDT", Interval::Day1, rows)
    }

    #[test]
    fn drops_missing_and_non_positive_rows() {
        let frame = build_frame(&candles(&[1.0, f64::NAN, 0.0, -2.0, 5.0]), PriceField::Close, 1).unwrap();
        assert_eq!(frame.values(), vec![1.0, 5.0]);
    }

    #[test]
    fn selects_price_column() {
        let frame = build_frame(&candles(&[1.0, 2.0]), PriceField::High, 1).unwrap();
        assert_eq!(frame.values(), vec![12.0, 12.0]);
    }

    #[test]
    fn too_short_is_validation_error() {
        let err = build_frame(&candles(&[1.0, 2.0, 3.0]), PriceField::Close, 4).unwrap_err();
        assert!(matches!(err, ProcessError::Validation(_)));
    }

    #[test]
    fn sub_daily_candles_keep_last_of_day() {
        let mut series = candles(&[1.0, 2.0]);
        let mut late = series.candles[0].clone();
        late.open_time += Duration::hours(12);
        late.close = 1.5;
        series.candles.insert(1, late);
        series.interval = Interval::Hour12;

        let frame = build_frame(&series, PriceField::Close, 1).unwrap();
        assert_eq!(frame.values(), vec![1.5, 2.0]);
    }

    #[test]
    fn volume_feature_floors_non_positive() {
        let series = candles(&[1.0, 2.0, 3.0]);
        let frame = build_frame(&series, PriceField::Close, 1).unwrap();
        let with_volume = add_volume_feature(&frame, &series).unwrap();
        assert_eq!(with_volume.volumes().unwrap(), vec![VOLUME_FLOOR, 1.0, 2.0]);
        assert_eq!(with_volume.values(), frame.values());
    }

    #[test]
    fn split_holds_out_suffix() {
        let frame = build_frame(&candles(&[1.0; 40]), PriceField::Close, 1).unwrap();
        let split = split_train_test(&frame, 30).unwrap();
        assert_eq!(split.train.len(), 10);
        assert_eq!(split.test.len(), 30);
        assert!(split.train.last().unwrap().date < split.test.first().unwrap().date);
    }

    #[test]
    fn split_rejects_bad_holdout() {
        let frame = build_frame(&candles(&[1.0; 5]), PriceField::Close, 1).unwrap();
        assert!(matches!(split_train_test(&frame, 5), Err(ProcessError::Configuration(_))));
        assert!(matches!(split_train_test(&frame, 0), Err(ProcessError::Configuration(_))));
    }
}

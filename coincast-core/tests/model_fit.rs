//! End-to-end checks of the model against synthetic market data.

use chrono::{Duration, TimeZone, Utc};
use coincast_core::{
    build_frame, evaluate, fetch_candles, split_train_test, validate_candles, DecomposableModel,
    Hyperparameters, IngestRequest, Interval, PriceField, SyntheticProvider,
};

fn two_years() -> coincast_core::TimeSeriesFrame {
    let end = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let request = IngestRequest::lookback("BTCUSDT", Interval::Day1, 2, end, 1000);
    let candles = validate_candles(fetch_candles(&SyntheticProvider::new(), &request).unwrap()).unwrap();
    build_frame(&candles, PriceField::Close, 365).unwrap()
}

#[test]
fn two_years_with_thirty_day_holdout() {
    let frame = two_years();
    assert_eq!(frame.len(), 731);

    let split = split_train_test(&frame, 30).unwrap();
    assert_eq!(split.train.len(), frame.len() - 30);

    let model = DecomposableModel::fit(&split.train, &Hyperparameters::default()).unwrap();
    let metrics = evaluate(&model, &split.test).unwrap();

    assert_eq!(metrics.test_samples, 30);
    assert_eq!(metrics.test_start, split.test.first().map(|o| o.date));
    assert!(metrics.mape < 10.0, "holdout MAPE too high: {}", metrics.mape);
    assert!(metrics.rmse >= metrics.mae);
}

#[test]
fn forecast_starts_after_training_window() {
    let frame = two_years();
    let model = DecomposableModel::fit(&frame, &Hyperparameters::default()).unwrap();
    let forecast = model.forecast(30).unwrap();

    assert_eq!(forecast.len(), 30);
    assert_eq!(forecast[0].date, frame.last().unwrap().date + Duration::days(1));
    assert!(forecast.iter().all(|p| p.yhat.is_finite() && p.lower > 0.0));
    assert_eq!(model.training_fingerprint(), &coincast_core::fingerprint::frame_hash(&frame));
}

#[test]
fn volume_regressor_end_to_end() {
    let end = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let request = IngestRequest::lookback("ETHUSDT", Interval::Day1, 1, end, 200);
    let candles = fetch_candles(&SyntheticProvider::new().with_base_price(2_000.0), &request).unwrap();
    let frame = build_frame(&candles, PriceField::Close, 300).unwrap();
    let frame = coincast_core::add_volume_feature(&frame, &candles).unwrap();

    let params = Hyperparameters {
        add_volume_regressor: true,
        ..Hyperparameters::default()
    };
    let model = DecomposableModel::fit(&frame, &params).unwrap();
    assert!(model.uses_volume());
    assert_eq!(model.forecast(14).unwrap().len(), 14);
}

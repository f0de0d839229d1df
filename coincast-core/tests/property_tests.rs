//! Property-based tests for the invariants that must hold for every input.
//!
//! 1. Ingestion output is strictly increasing in open time, however the pages overlap
//! 2. Train/test split: union equals the frame, train is a strict prefix
//! 3. Forecast length equals the horizon; dates follow the last training date
//! 4. Frame construction never yields non-positive values or repeated dates

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use coincast_core::data::provider::KlineRequest;
use coincast_core::{
    build_frame, fetch_candles, split_train_test, Candle, CandleSeries, DataError,
    DecomposableModel, Hyperparameters, IngestRequest, Interval, MarketDataProvider, Observation,
    PriceField, PriceQuote, SeasonalityMode, TimeSeriesFrame,
};
use proptest::prelude::*;
use std::sync::Mutex;

// ── Strategies ──

fn candle(day: i64, close: f64) -> Candle {
    let open_time = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap() + Duration::days(day);
    Candle {
        open_time,
        open: close,
        high: close,
        low: close,
        close,
        volume: 1.0,
        close_time: open_time + Duration::milliseconds(86_399_999),
        quote_volume: close,
        trades: 1,
    }
}

/// Pages of day offsets that may overlap or repeat, each sorted.
fn arb_pages() -> impl Strategy<Value = Vec<Vec<i64>>> {
    prop::collection::vec(
        (0i64..200, 1usize..20).prop_map(|(start, len)| (start..start + len as i64).collect()),
        1..8,
    )
}

fn arb_frame() -> impl Strategy<Value = TimeSeriesFrame> {
    prop::collection::vec(1.0f64..1_000.0, 2..120).prop_map(|values| {
        let d0 = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
        TimeSeriesFrame::new(
            values
                .into_iter()
                .enumerate()
                .map(|(i, v)| Observation::new(d0 + Duration::days(i as i64), v))
                .collect(),
        )
        .unwrap()
    })
}

struct Pages(Mutex<Vec<Vec<Candle>>>);

impl MarketDataProvider for Pages {
    fn name(&self) -> &str {
        "pages"
    }

    fn fetch_klines(&self, _: &KlineRequest) -> Result<Vec<Candle>, DataError> {
        let mut pages = self.0.lock().unwrap();
        Ok(if pages.is_empty() { Vec::new() } else { pages.remove(0) })
    }

    fn current_price(&self, symbol: &str) -> Result<PriceQuote, DataError> {
        Err(DataError::SymbolNotFound { symbol: symbol.into() })
    }
}

proptest! {
    #[test]
    fn ingestion_is_strictly_increasing(pages in arb_pages()) {
        let limit = pages.iter().map(Vec::len).max().unwrap_or(1) as u16;
        let provider = Pages(Mutex::new(
            pages
                .into_iter()
                .map(|days| days.into_iter().map(|d| candle(d, 100.0)).collect())
                .collect(),
        ));
        let request = IngestRequest {
            symbol: "BTCUSDT".into(),
            interval: Interval::Day1,
            start: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            page_limit: limit,
        };

        let series = fetch_candles(&provider, &request).unwrap();
        prop_assert!(series.is_strictly_increasing());
    }

    #[test]
    fn split_partitions_frame(frame in arb_frame(), holdout in 1usize..200) {
        match split_train_test(&frame, holdout) {
            Ok(split) => {
                prop_assert_eq!(split.train.len() + split.test.len(), frame.len());
                prop_assert_eq!(split.test.len(), holdout);
                prop_assert_eq!(split.train.observations(), &frame.observations()[..split.train.len()]);
                prop_assert!(!split.train.is_empty());
            }
            Err(_) => prop_assert!(holdout >= frame.len()),
        }
    }

    #[test]
    fn frame_rows_are_positive_and_unique(closes in prop::collection::vec(-10.0f64..10.0, 0..60)) {
        let series = CandleSeries::new(
            "BTCUSDT",
            Interval::Day1,
            closes.iter().enumerate().map(|(i, &c)| candle(i as i64, c)).collect(),
        );
        if let Ok(frame) = build_frame(&series, PriceField::Close, 0) {
            prop_assert!(frame.values().iter().all(|v| *v > 0.0));
            prop_assert!(frame.dates().windows(2).all(|w| w[0] < w[1]));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn forecast_has_exact_horizon(frame in arb_frame(), horizon in 1usize..120) {
        let params = Hyperparameters {
            seasonality_mode: SeasonalityMode::Additive,
            yearly_seasonality: false,
            halving_cycle: false,
            ..Hyperparameters::default()
        };
        prop_assume!(frame.len() >= 3);
        let model = DecomposableModel::fit(&frame, &params).unwrap();
        let forecast = model.forecast(horizon).unwrap();

        prop_assert_eq!(forecast.len(), horizon);
        prop_assert!(forecast[0].date > model.last_date());
        prop_assert!(forecast.windows(2).all(|w| w[1].date == w[0].date + Duration::days(1)));
        prop_assert!(forecast.iter().all(|p| p.lower <= p.yhat && p.yhat <= p.upper));
    }
}

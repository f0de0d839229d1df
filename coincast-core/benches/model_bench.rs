use chrono::{TimeZone, Utc};
use coincast_core::{
    build_frame, fetch_candles, DecomposableModel, Hyperparameters, IngestRequest, Interval,
    PriceField, SyntheticProvider,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_fit(c: &mut Criterion) {
    let end = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let request = IngestRequest::lookback("BTCUSDT", Interval::Day1, 4, end, 1000);
    let candles = fetch_candles(&SyntheticProvider::new(), &request).expect("synthetic data");
    let frame = build_frame(&candles, PriceField::Close, 365).expect("frame");
    let params = Hyperparameters::default();

    c.bench_function("fit_4y_daily", |b| {
        b.iter(|| DecomposableModel::fit(black_box(&frame), black_box(&params)))
    });

    let model = DecomposableModel::fit(&frame, &params).expect("fit");
    c.bench_function("forecast_365d", |b| b.iter(|| model.forecast(black_box(365))));
}

criterion_group!(benches, bench_fit);
criterion_main!(benches);

//! Deterministic offline market data.
//!
//! Each candle is a pure function of (symbol, open time): a log-linear drift,
//! a yearly and a weekly cycle, and noise from a `StdRng` seeded with the
//! BLAKE3 hash of the symbol and timestamp. Pages therefore agree no matter
//! how a range is split, which keeps pagination testable without a network.

use super::provider::{DataError, KlineRequest, MarketDataProvider, PriceQuote};
use crate::domain::Candle;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

const DAY_MS: f64 = 86_400_000.0;
/// 2020-01-01T00:00:00Z, the point where the drift term is zero.
const ANCHOR_MS: i64 = 1_577_836_800_000;

#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    base_price: f64,
    annual_drift: f64,
    noise: f64,
}

impl Default for SyntheticProvider {
    fn default() -> Self {
        Self {
            base_price: 10_000.0,
            annual_drift: 0.35,
            noise: 0.01,
        }
    }
}

impl SyntheticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_price(mut self, base_price: f64) -> Self {
        self.base_price = base_price;
        self
    }

    fn rng_for(symbol: &str, open_ms: i64) -> StdRng {
        let mut hasher = blake3::Hasher::new();
        hasher.update(symbol.as_bytes());
        hasher.update(&open_ms.to_le_bytes());
        StdRng::from_seed(*hasher.finalize().as_bytes())
    }

    /// Noise-free log price at a timestamp.
    fn log_level(&self, at_ms: i64) -> f64 {
        let days = (at_ms - ANCHOR_MS) as f64 / DAY_MS;
        self.base_price.ln()
            + self.annual_drift * days / 365.25
            + 0.20 * (2.0 * PI * days / 365.25).sin()
            + 0.02 * (2.0 * PI * days / 7.0).sin()
    }

    fn candle_at(&self, symbol: &str, open_ms: i64, step_ms: i64) -> Result<Candle, DataError> {
        let mut rng = Self::rng_for(symbol, open_ms);
        let open = self.log_level(open_ms).exp();
        let noise = if self.noise > 0.0 {
            rng.gen_range(-self.noise..self.noise)
        } else {
            0.0
        };
        let close = (self.log_level(open_ms + step_ms) + noise).exp();
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
        let volume: f64 = rng.gen_range(1_000.0..50_000.0);

        let to_time = |ms: i64| {
            DateTime::<Utc>::from_timestamp_millis(ms)
                .ok_or_else(|| DataError::Other(format!("timestamp out of range: {ms}")))
        };

        Ok(Candle {
            open_time: to_time(open_ms)?,
            open,
            high,
            low,
            close,
            volume,
            close_time: to_time(open_ms + step_ms - 1)?,
            quote_volume: volume * (open + close) / 2.0,
            trades: rng.gen_range(10_000..2_000_000),
        })
    }
}

impl MarketDataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch_klines(&self, request: &KlineRequest) -> Result<Vec<Candle>, DataError> {
        let step = request.interval.duration_ms();
        // first aligned open time at or after start
        let mut open_ms = request.start_ms.div_euclid(step) * step;
        if open_ms < request.start_ms {
            open_ms += step;
        }

        let mut candles = Vec::new();
        while open_ms <= request.end_ms && candles.len() < request.limit as usize {
            candles.push(self.candle_at(&request.symbol, open_ms, step)?);
            open_ms += step;
        }
        Ok(candles)
    }

    fn current_price(&self, symbol: &str) -> Result<PriceQuote, DataError> {
        let now = Utc::now();
        let mut rng = Self::rng_for(symbol, now.timestamp_millis());
        let noise = if self.noise > 0.0 {
            rng.gen_range(-self.noise..self.noise)
        } else {
            0.0
        };
        Ok(PriceQuote {
            symbol: symbol.to_string(),
            price: (self.log_level(now.timestamp_millis()) + noise).exp(),
            timestamp: now,
        })
    }
}

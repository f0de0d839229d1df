//! Binance spot market-data provider.
//!
//! Pages through `GET /api/v3/klines` and reads spot prices from
//! `GET /api/v3/ticker/price`. Every numeric field of a kline arrives as a
//! JSON string; fields that fail to parse become NaN and are forward-filled
//! later by `validate_candles`.

use super::provider::{DataError, KlineRequest, MarketDataProvider, PriceQuote};
use crate::domain::Candle;
use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

/// Largest page the klines endpoint serves.
pub const MAX_PAGE_LIMIT: u16 = 1000;

/// Exchange error code for an unknown symbol.
const INVALID_SYMBOL_CODE: i64 = -1121;

/// One kline as the exchange sends it:
/// open time, open, high, low, close, volume, close time, quote volume,
/// trade count, taker buy base, taker buy quote, ignore.
type RawKline = (
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    u64,
    String,
    String,
    String,
);

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

pub struct BinanceProvider {
    client: Client,
    base_url: String,
}

impl BinanceProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DataError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("coincast/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn klines_url(&self) -> String {
        format!("{}/api/v3/klines", self.base_url)
    }

    fn ticker_url(&self) -> String {
        format!("{}/api/v3/ticker/price", self.base_url)
    }

    /// Map non-success statuses onto `DataError`.
    fn check_status(symbol: &str, resp: Response) -> Result<Response, DataError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
            let retry_after_secs = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(60);
            return Err(DataError::RateLimited { retry_after_secs });
        }

        let body = resp.text().unwrap_or_default();
        if let Ok(api_error) = serde_json::from_str::<ApiError>(&body) {
            if api_error.code == INVALID_SYMBOL_CODE {
                return Err(DataError::SymbolNotFound {
                    symbol: symbol.to_string(),
                });
            }
            return Err(DataError::HttpStatus {
                status: status.as_u16(),
                body: format!("{} ({})", api_error.msg, api_error.code),
            });
        }

        Err(DataError::HttpStatus {
            status: status.as_u16(),
            body,
        })
    }
}

impl MarketDataProvider for BinanceProvider {
    fn name(&self) -> &str {
        "binance"
    }

    fn fetch_klines(&self, request: &KlineRequest) -> Result<Vec<Candle>, DataError> {
        let limit = request.limit.clamp(1, MAX_PAGE_LIMIT);
        let query = [
            ("symbol", request.symbol.clone()),
            ("interval", request.interval.as_str().to_string()),
            ("startTime", request.start_ms.to_string()),
            ("endTime", request.end_ms.to_string()),
            ("limit", limit.to_string()),
        ];

        let resp = self
            .client
            .get(self.klines_url())
            .query(&query)
            .send()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;
        let resp = Self::check_status(&request.symbol, resp)?;

        let raw: Vec<RawKline> = resp
            .json()
            .map_err(|e| DataError::ResponseFormatChanged(format!("klines payload: {e}")))?;

        raw.into_iter().map(parse_kline).collect()
    }

    fn current_price(&self, symbol: &str) -> Result<PriceQuote, DataError> {
        let resp = self
            .client
            .get(self.ticker_url())
            .query(&[("symbol", symbol)])
            .send()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;
        let resp = Self::check_status(symbol, resp)?;

        let ticker: TickerPrice = resp
            .json()
            .map_err(|e| DataError::ResponseFormatChanged(format!("ticker payload: {e}")))?;
        parse_ticker(ticker, Utc::now())
    }
}

fn parse_kline(raw: RawKline) -> Result<Candle, DataError> {
    let (open_ms, open, high, low, close, volume, close_ms, quote_volume, trades, _, _, _) = raw;
    Ok(Candle {
        open_time: timestamp(open_ms)?,
        open: parse_number(&open),
        high: parse_number(&high),
        low: parse_number(&low),
        close: parse_number(&close),
        volume: parse_number(&volume),
        close_time: timestamp(close_ms)?,
        quote_volume: parse_number(&quote_volume),
        trades,
    })
}

fn parse_ticker(ticker: TickerPrice, now: DateTime<Utc>) -> Result<PriceQuote, DataError> {
    let price: f64 = ticker.price.parse().map_err(|_| {
        DataError::ResponseFormatChanged(format!("unparseable price '{}'", ticker.price))
    })?;
    Ok(PriceQuote {
        symbol: ticker.symbol,
        price,
        timestamp: now,
    })
}

fn timestamp(ms: i64) -> Result<DateTime<Utc>, DataError> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| DataError::ResponseFormatChanged(format!("invalid timestamp: {ms}")))
}

fn parse_number(field: &str) -> f64 {
    field.trim().parse().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"[
        [1704067200000, "42283.58", "44184.10", "42180.77", "44179.55", "27174.29903",
         1704153599999, "1169985608.47", 1185310, "13934.78", "600018392.45", "0"],
        [1704153600000, "44179.55", "45879.63", "44148.34", "44946.91", "65146.40661",
         1704239999999, "2909489525.67", 2076349, "33148.63", "1480442187.62", "0"]
    ]"#;

    #[test]
    fn parses_kline_page() {
        let raw: Vec<RawKline> = serde_json::from_str(PAGE).unwrap();
        let candles: Vec<Candle> = raw.into_iter().map(parse_kline).collect::<Result<_, _>>().unwrap();

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open_time.timestamp_millis(), 1_704_067_200_000);
        assert_eq!(candles[0].close, 44179.55);
        assert_eq!(candles[1].trades, 2_076_349);
        assert!(candles[0].close_time < candles[1].open_time);
    }

    #[test]
    fn unparseable_fields_become_nan() {
        let raw: RawKline = (
            1704067200000,
            "1.0".into(),
            "oops".into(),
            "1.0".into(),
            "1.0".into(),
            "".into(),
            1704153599999,
            "0".into(),
            0,
            "0".into(),
            "0".into(),
            "0".into(),
        );
        let candle = parse_kline(raw).unwrap();
        assert!(candle.high.is_nan());
        assert!(candle.volume.is_nan());
        assert!(candle.has_missing());
    }

    #[test]
    fn short_rows_are_a_format_change() {
        let result = serde_json::from_str::<Vec<RawKline>>(r#"[[1704067200000, "1.0"]]"#);
        assert!(result.is_err());
    }

    #[test]
    fn ticker_parsing() {
        let ticker: TickerPrice =
            serde_json::from_str(r#"{"symbol":"BTCUSDT","price":"67012.34000000"}"#).unwrap();
        let quote = parse_ticker(ticker, Utc::now()).unwrap();
        assert_eq!(quote.symbol, "BTCUSDT");
        assert_eq!(quote.price, 67012.34);

        let bad = TickerPrice {
            symbol: "BTCUSDT".into(),
            price: "n/a".into(),
        };
        assert!(matches!(
            parse_ticker(bad, Utc::now()),
            Err(DataError::ResponseFormatChanged(_))
        ));
    }

    #[test]
    fn base_url_is_normalized() {
        let provider = BinanceProvider::new("http://localhost:9/", Duration::from_secs(1)).unwrap();
        assert_eq!(provider.klines_url(), "http://localhost:9/api/v3/klines");
        assert_eq!(provider.ticker_url(), "http://localhost:9/api/v3/ticker/price");
    }
}

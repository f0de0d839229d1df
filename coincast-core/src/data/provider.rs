//! Market-data provider trait and structured error types.
//!
//! `MarketDataProvider` abstracts over the exchange so the pipeline can run
//! against the live API, the synthetic generator, or a test double.

use super::interval::Interval;
use crate::domain::Candle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured error types for market-data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by exchange (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("exchange returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("data error: {0}")]
    Other(String),
}

impl DataError {
    /// Errors about the data itself rather than the fetch.
    pub fn is_validation(&self) -> bool {
        matches!(self, DataError::ValidationError(_))
    }
}

/// One bounded page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KlineRequest {
    pub symbol: String,
    pub interval: Interval,
    /// Inclusive lower bound on candle open time, epoch millis.
    pub start_ms: i64,
    /// Inclusive upper bound on candle open time, epoch millis.
    pub end_ms: i64,
    pub limit: u16,
}

/// Latest traded price for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// A source of exchange klines and spot prices.
///
/// Implementations make a single attempt per call; retry policy belongs to callers.
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch at most `request.limit` candles with open time in `[start_ms, end_ms]`,
    /// ordered by open time.
    fn fetch_klines(&self, request: &KlineRequest) -> Result<Vec<Candle>, DataError>;

    /// Fetch the latest price for a symbol.
    fn current_price(&self, symbol: &str) -> Result<PriceQuote, DataError>;
}

//! Paginated candle ingestion and raw-data validation.

use super::interval::Interval;
use super::provider::{DataError, KlineRequest, MarketDataProvider};
use crate::domain::{Candle, CandleSeries};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

/// What to ingest: a symbol, an interval and a closed time window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    pub symbol: String,
    pub interval: Interval,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub page_limit: u16,
}

impl IngestRequest {
    /// Window of `years * 365` days ending at `end`.
    pub fn lookback(
        symbol: impl Into<String>,
        interval: Interval,
        years: u32,
        end: DateTime<Utc>,
        page_limit: u16,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            interval,
            start: end - Duration::days(365 * i64::from(years)),
            end,
            page_limit,
        }
    }
}

/// Fetch every candle in the window with successive bounded requests.
///
/// Each page starts one millisecond after the previous page's last close
/// time. The loop stops on an empty or short page, or once the cursor passes
/// the end of the window. Candles whose open time does not move past the last
/// kept candle are dropped, so the output is strictly increasing.
pub fn fetch_candles(
    provider: &dyn MarketDataProvider,
    request: &IngestRequest,
) -> Result<CandleSeries, DataError> {
    let start_ms = request.start.timestamp_millis();
    let end_ms = request.end.timestamp_millis();
    if start_ms > end_ms {
        return Err(DataError::ValidationError(format!(
            "ingestion window starts after it ends ({} > {})",
            request.start, request.end
        )));
    }
    let limit = request.page_limit.max(1);

    let mut candles: Vec<Candle> = Vec::new();
    let mut cursor = start_ms;
    let mut pages = 0usize;

    while cursor <= end_ms {
        let page = provider.fetch_klines(&KlineRequest {
            symbol: request.symbol.clone(),
            interval: request.interval,
            start_ms: cursor,
            end_ms,
            limit,
        })?;
        pages += 1;
        debug!(
            provider = provider.name(),
            page = pages,
            rows = page.len(),
            cursor,
            "fetched kline page"
        );

        let Some(last) = page.last() else {
            break;
        };
        let next_cursor = last.close_time.timestamp_millis() + 1;
        let short_page = page.len() < limit as usize;

        for candle in page {
            let advances = candles
                .last()
                .map_or(true, |prev| candle.open_time > prev.open_time);
            if advances {
                candles.push(candle);
            }
        }

        if short_page || next_cursor <= cursor {
            break;
        }
        cursor = next_cursor;
    }

    info!(
        symbol = %request.symbol,
        interval = %request.interval,
        candles = candles.len(),
        pages,
        "ingestion complete"
    );
    Ok(CandleSeries::new(
        request.symbol.clone(),
        request.interval,
        candles,
    ))
}

/// Validate raw candles before processing.
///
/// - an empty series is an error
/// - NaN fields are forward-filled from the previous candle (leading NaNs stay)
/// - negative open/high/low/close is an error
pub fn validate_candles(mut series: CandleSeries) -> Result<CandleSeries, DataError> {
    if series.is_empty() {
        return Err(DataError::ValidationError(format!(
            "no candles returned for {}",
            series.symbol
        )));
    }

    let mut filled = 0usize;
    let mut previous: Option<Candle> = None;
    for candle in series.candles.iter_mut() {
        if let Some(prev) = &previous {
            if candle.has_missing() {
                filled += 1;
                forward_fill(candle, prev);
            }
        }
        previous = Some(candle.clone());
    }
    if filled > 0 {
        warn!(
            symbol = %series.symbol,
            rows = filled,
            "forward-filled candles with missing values"
        );
    }

    if let Some(bad) = series.candles.iter().find(|c| c.has_negative_price()) {
        return Err(DataError::ValidationError(format!(
            "negative price in candle opened at {}",
            bad.open_time
        )));
    }

    Ok(series)
}

fn forward_fill(candle: &mut Candle, prev: &Candle) {
    let fill = |v: &mut f64, p: f64| {
        if v.is_nan() {
            *v = p;
        }
    };
    fill(&mut candle.open, prev.open);
    fill(&mut candle.high, prev.high);
    fill(&mut candle.low, prev.low);
    fill(&mut candle.close, prev.close);
    fill(&mut candle.volume, prev.volume);
    fill(&mut candle.quote_volume, prev.quote_volume);
}

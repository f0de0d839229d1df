//! Market data: provider abstraction, exchange client, ingestion, artifact store.

pub mod binance;
pub mod ingest;
pub mod interval;
pub mod provider;
pub mod store;
pub mod synthetic;

pub use binance::BinanceProvider;
pub use ingest::{fetch_candles, validate_candles, IngestRequest};
pub use interval::Interval;
pub use provider::{DataError, KlineRequest, MarketDataProvider, PriceQuote};
pub use store::{ArtifactStore, CandleMeta, ForecastMeta, StoreError};
pub use synthetic::SyntheticProvider;

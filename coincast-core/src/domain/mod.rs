//! Domain types shared by every pipeline stage.

pub mod candle;
pub mod forecast;
pub mod ids;
pub mod series;

pub use candle::{Candle, CandleSeries, PriceField};
pub use forecast::{ForecastPoint, ForecastTable};
pub use ids::{DatasetHash, RunId};
pub use series::{FrameError, Observation, TimeSeriesFrame, ValueStats};

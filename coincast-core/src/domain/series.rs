//! Date/value time series frame, the model's input contract.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One row of the frame. `volume` is only present when the volume feature was added.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: f64,
    pub volume: Option<f64>,
}

impl Observation {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self {
            date,
            value,
            volume: None,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("dates must be strictly increasing (row {index}: {date})")]
    NotIncreasing { index: usize, date: NaiveDate },

    #[error("value at {date} must be finite and positive, got {value}")]
    NonPositive { date: NaiveDate, value: f64 },
}

/// Ordered (date, value) frame: dates unique and strictly increasing, values positive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFrame")]
pub struct TimeSeriesFrame {
    observations: Vec<Observation>,
}

/// Wire shape of a frame; only becomes a `TimeSeriesFrame` through `new`.
#[derive(Deserialize)]
struct RawFrame {
    observations: Vec<Observation>,
}

impl TryFrom<RawFrame> for TimeSeriesFrame {
    type Error = FrameError;

    fn try_from(raw: RawFrame) -> Result<Self, Self::Error> {
        TimeSeriesFrame::new(raw.observations)
    }
}

/// Min/max/mean of the value column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl TimeSeriesFrame {
    pub fn new(observations: Vec<Observation>) -> Result<Self, FrameError> {
        for (index, obs) in observations.iter().enumerate() {
            if !obs.value.is_finite() || obs.value <= 0.0 {
                return Err(FrameError::NonPositive {
                    date: obs.date,
                    value: obs.value,
                });
            }
            if index > 0 && observations[index - 1].date >= obs.date {
                return Err(FrameError::NotIncreasing {
                    index,
                    date: obs.date,
                });
            }
        }
        Ok(Self { observations })
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn first(&self) -> Option<&Observation> {
        self.observations.first()
    }

    pub fn last(&self) -> Option<&Observation> {
        self.observations.last()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.observations.iter().map(|o| o.date).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.value).collect()
    }

    /// Volume column, only when every row carries one.
    pub fn volumes(&self) -> Option<Vec<f64>> {
        self.observations.iter().map(|o| o.volume).collect()
    }

    pub fn has_volume(&self) -> bool {
        !self.observations.is_empty() && self.observations.iter().all(|o| o.volume.is_some())
    }

    /// Split into `[0, at)` and `[at, len)`. Both halves keep the frame invariants.
    pub fn split_at(&self, at: usize) -> (TimeSeriesFrame, TimeSeriesFrame) {
        let at = at.min(self.observations.len());
        let (head, tail) = self.observations.split_at(at);
        (
            TimeSeriesFrame {
                observations: head.to_vec(),
            },
            TimeSeriesFrame {
                observations: tail.to_vec(),
            },
        )
    }

    pub fn value_stats(&self) -> Option<ValueStats> {
        if self.observations.is_empty() {
            return None;
        }
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for obs in &self.observations {
            min = min.min(obs.value);
            max = max.max(obs.value);
            sum += obs.value;
        }
        Some(ValueStats {
            min,
            max,
            mean: sum / self.observations.len() as f64,
        })
    }
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One forecast row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub predicted_price: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub trend: f64,
}

/// Forward-looking forecast produced by one registered model version.
///
/// Dates start the day after `last_training_date` and are consecutive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastTable {
    pub model_version: u32,
    pub symbol: String,
    pub last_training_date: NaiveDate,
    pub last_training_value: f64,
    pub points: Vec<ForecastPoint>,
}

impl ForecastTable {
    pub fn horizon(&self) -> usize {
        self.points.len()
    }

    /// First `days` rows, or `None` when the table is shorter than that.
    pub fn truncated(&self, days: usize) -> Option<ForecastTable> {
        if days > self.points.len() {
            return None;
        }
        Some(ForecastTable {
            points: self.points[..days].to_vec(),
            ..self.clone()
        })
    }

    /// Consecutive dates, all after the last training date.
    pub fn is_contiguous(&self) -> bool {
        let mut expected = self.last_training_date;
        for point in &self.points {
            match expected.succ_opt() {
                Some(next) if next == point.date => expected = next,
                _ => return false,
            }
        }
        true
    }
}

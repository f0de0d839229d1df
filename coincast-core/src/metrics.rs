//! Holdout evaluation metrics. Pure functions: actuals and predictions in, scalar out.

use crate::domain::TimeSeriesFrame;
use crate::model::{DecomposableModel, ModelError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Guards MAPE against zero actuals.
pub const MAPE_EPSILON: f64 = 1e-10;

/// Metrics for one model version against its test partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub mae: f64,
    /// Percent, not a fraction.
    pub mape: f64,
    pub rmse: f64,
    pub r2: f64,
    pub test_samples: usize,
    pub test_start: Option<NaiveDate>,
    pub test_end: Option<NaiveDate>,
}

impl EvaluationMetrics {
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Self {
        Self {
            mae: mae(actual, predicted),
            mape: mape(actual, predicted),
            rmse: rmse(actual, predicted),
            r2: r_squared(actual, predicted),
            test_samples: actual.len().min(predicted.len()),
            test_start: None,
            test_end: None,
        }
    }

    /// Metric name → value, the shape the tracker and the HTTP layer expose.
    pub fn as_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("mae".to_string(), self.mae),
            ("mape".to_string(), self.mape),
            ("rmse".to_string(), self.rmse),
            ("r2".to_string(), self.r2),
        ])
    }
}

/// Score `model` on `test`.
pub fn evaluate(
    model: &DecomposableModel,
    test: &TimeSeriesFrame,
) -> Result<EvaluationMetrics, ModelError> {
    let predictions = model.predict_frame(test)?;
    let predicted: Vec<f64> = predictions.iter().map(|p| p.yhat).collect();
    let metrics = EvaluationMetrics {
        test_start: test.first().map(|o| o.date),
        test_end: test.last().map(|o| o.date),
        ..EvaluationMetrics::compute(&test.values(), &predicted)
    };
    info!(
        mae = metrics.mae,
        mape = metrics.mape,
        rmse = metrics.rmse,
        r2 = metrics.r2,
        samples = metrics.test_samples,
        "evaluated model on holdout"
    );
    Ok(metrics)
}

// ─── Individual metric functions ────────────────────────────────────

fn pairs<'a>(actual: &'a [f64], predicted: &'a [f64]) -> impl Iterator<Item = (f64, f64)> + 'a {
    actual.iter().copied().zip(predicted.iter().copied())
}

/// Mean absolute error.
pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    pairs(actual, predicted).map(|(a, p)| (a - p).abs()).sum::<f64>() / n as f64
}

/// Mean absolute percentage error, in percent.
pub fn mape(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = pairs(actual, predicted)
        .map(|(a, p)| (a - p).abs() / (a.abs() + MAPE_EPSILON))
        .sum();
    sum / n as f64 * 100.0
}

/// Root mean squared error.
pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    (pairs(actual, predicted).map(|(a, p)| (a - p).powi(2)).sum::<f64>() / n as f64).sqrt()
}

/// Coefficient of determination.
///
/// A constant actual series has no variance to explain: a perfect fit scores
/// 1.0 and anything else 0.0.
pub fn r_squared(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    let mean = actual[..n].iter().sum::<f64>() / n as f64;
    let ss_res: f64 = pairs(actual, predicted).map(|(a, p)| (a - p).powi(2)).sum();
    let ss_tot: f64 = actual[..n].iter().map(|a| (a - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions() {
        let y = [10.0, 12.0, 14.0];
        let m = EvaluationMetrics::compute(&y, &y);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.mape, 0.0);
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.r2, 1.0);
        assert_eq!(m.test_samples, 3);
    }

    #[test]
    fn known_values() {
        let actual = [100.0, 200.0];
        let predicted = [110.0, 180.0];
        assert!((mae(&actual, &predicted) - 15.0).abs() < 1e-12);
        assert!((mape(&actual, &predicted) - 10.0).abs() < 1e-9);
        assert!((rmse(&actual, &predicted) - (250.0f64).sqrt()).abs() < 1e-12);
        // ss_res = 500, ss_tot = 5000
        assert!((r_squared(&actual, &predicted) - 0.9).abs() < 1e-12);
    }

    #[test]
    fn predicting_the_mean_scores_zero() {
        let actual = [1.0, 2.0, 3.0];
        assert!(r_squared(&actual, &[2.0, 2.0, 2.0]).abs() < 1e-12);
    }

    #[test]
    fn constant_actuals() {
        assert_eq!(r_squared(&[5.0, 5.0], &[5.0, 5.0]), 1.0);
        assert_eq!(r_squared(&[5.0, 5.0], &[4.0, 6.0]), 0.0);
    }

    #[test]
    fn empty_inputs() {
        let m = EvaluationMetrics::compute(&[], &[]);
        assert_eq!(m.test_samples, 0);
        assert_eq!(m.mae, 0.0);
    }

    #[test]
    fn map_has_four_metrics() {
        let m = EvaluationMetrics::compute(&[1.0, 2.0], &[1.0, 2.5]);
        let map = m.as_map();
        assert_eq!(map.len(), 4);
        assert_eq!(map["mae"], 0.25);
    }
}

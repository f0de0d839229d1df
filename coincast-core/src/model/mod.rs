//! Decomposable forecasting model.
//!
//! `y(t) = trend(t) + seasonality(t) + beta * volume(t) + noise`, fitted on
//! `y / max|y|` (additive mode) or `ln y` (multiplicative mode):
//! - trend: piecewise linear, with rate changes at `n_changepoints` points
//!   spread over the first `changepoint_range` of history
//! - seasonality: yearly, weekly and halving-cycle Fourier terms
//! - volume: optional standardized regressor
//!
//! Coefficients are a MAP estimate under Gaussian priors, computed as a ridge
//! regression. Changepoint rates use `changepoint_prior_scale`, seasonal and
//! regressor terms use `seasonality_prior_scale`. Noise variance comes from a
//! weakly regularized first pass. Intervals widen with the distance past the
//! last training date, scaled by the average changepoint magnitude.

pub mod seasonality;

pub use seasonality::Seasonality;

use crate::domain::{DatasetHash, TimeSeriesFrame};
use crate::fingerprint;
use chrono::{Duration, NaiveDate};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use thiserror::Error;
use tracing::debug;

/// Prior scale of the base growth rate and offset.
const TREND_PRIOR_SCALE: f64 = 5.0;
/// Noise variance assumed for the first, weakly regularized pass.
const WEAK_NOISE_VARIANCE: f64 = 1e-6;
const MIN_NOISE_VARIANCE: f64 = 1e-8;
pub const MIN_FIT_OBSERVATIONS: usize = 3;
/// Future volume is the mean of this many trailing training observations.
pub const VOLUME_TRAILING_WINDOW: usize = 30;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("not enough observations to fit: {got} (need at least {need})")]
    InsufficientData { got: usize, need: usize },

    #[error("invalid hyperparameter: {0}")]
    InvalidHyperparameter(String),

    #[error("normal equations are singular")]
    Singular,

    #[error("model uses a volume regressor but no volume was supplied")]
    MissingRegressor,

    #[error("forecast horizon must be at least one day")]
    EmptyHorizon,

    #[error("malformed model: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonalityMode {
    Additive,
    #[default]
    Multiplicative,
}

impl SeasonalityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeasonalityMode::Additive => "additive",
            SeasonalityMode::Multiplicative => "multiplicative",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    pub seasonality_mode: SeasonalityMode,
    pub yearly_seasonality: bool,
    pub weekly_seasonality: bool,
    pub halving_cycle: bool,
    pub changepoint_prior_scale: f64,
    pub seasonality_prior_scale: f64,
    pub changepoint_range: f64,
    pub n_changepoints: usize,
    pub interval_width: f64,
    pub add_volume_regressor: bool,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            seasonality_mode: SeasonalityMode::Multiplicative,
            yearly_seasonality: true,
            weekly_seasonality: true,
            halving_cycle: true,
            changepoint_prior_scale: 0.05,
            seasonality_prior_scale: 10.0,
            changepoint_range: 0.8,
            n_changepoints: 25,
            interval_width: 0.8,
            add_volume_regressor: false,
        }
    }
}

impl Hyperparameters {
    pub fn validate(&self) -> Result<(), ModelError> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(ModelError::InvalidHyperparameter(format!(
                    "{name} must be positive, got {v}"
                )))
            }
        };
        positive("changepoint_prior_scale", self.changepoint_prior_scale)?;
        positive("seasonality_prior_scale", self.seasonality_prior_scale)?;

        if !(self.changepoint_range > 0.0 && self.changepoint_range <= 1.0) {
            return Err(ModelError::InvalidHyperparameter(format!(
                "changepoint_range must be in (0, 1], got {}",
                self.changepoint_range
            )));
        }
        if !(self.interval_width > 0.0 && self.interval_width < 1.0) {
            return Err(ModelError::InvalidHyperparameter(format!(
                "interval_width must be in (0, 1), got {}",
                self.interval_width
            )));
        }
        Ok(())
    }

    /// Seasonal components switched on by the flags.
    pub fn seasonalities(&self) -> Vec<Seasonality> {
        let mut out = Vec::new();
        if self.yearly_seasonality {
            out.push(Seasonality::yearly());
        }
        if self.weekly_seasonality {
            out.push(Seasonality::weekly());
        }
        if self.halving_cycle {
            out.push(Seasonality::halving_cycle());
        }
        out
    }
}

/// Point estimate, interval and trend for one date, in price units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub date: NaiveDate,
    pub yhat: f64,
    pub lower: f64,
    pub upper: f64,
    pub trend: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct VolumeStats {
    mean: f64,
    std: f64,
}

impl VolumeStats {
    fn from_values(values: &[f64]) -> Self {
        let n = values.len().max(1) as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = if var > 0.0 { var.sqrt() } else { 1.0 };
        Self { mean, std }
    }

    fn standardize(&self, v: f64) -> f64 {
        (v - self.mean) / self.std
    }
}

/// A fitted model. Serializable, so the registry can persist it as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecomposableModel {
    hyperparameters: Hyperparameters,
    seasonalities: Vec<Seasonality>,
    start_date: NaiveDate,
    last_date: NaiveDate,
    last_value: f64,
    span_days: f64,
    y_scale: f64,
    /// Changepoint locations in scaled time, `[0, 1]`.
    changepoints: Vec<f64>,
    coefficients: Vec<f64>,
    sigma: f64,
    mean_abs_delta: f64,
    volume_stats: Option<VolumeStats>,
    recent_volume_mean: Option<f64>,
    training_fingerprint: DatasetHash,
    n_observations: usize,
}

impl DecomposableModel {
    pub const MODEL_TYPE: &'static str = "decomposable";

    /// Fit on a frame. Needs a volume column when the volume regressor is on.
    pub fn fit(frame: &TimeSeriesFrame, params: &Hyperparameters) -> Result<Self, ModelError> {
        params.validate()?;
        let obs = frame.observations();
        let n = obs.len();
        if n < MIN_FIT_OBSERVATIONS {
            return Err(ModelError::InsufficientData {
                got: n,
                need: MIN_FIT_OBSERVATIONS,
            });
        }
        let first = obs[0];
        let last = obs[n - 1];

        let (volume_stats, recent_volume_mean) = if params.add_volume_regressor {
            let volumes = frame.volumes().ok_or(ModelError::MissingRegressor)?;
            let tail = &volumes[volumes.len().saturating_sub(VOLUME_TRAILING_WINDOW)..];
            let recent = tail.iter().sum::<f64>() / tail.len() as f64;
            (Some(VolumeStats::from_values(&volumes)), Some(recent))
        } else {
            (None, None)
        };

        let mut model = DecomposableModel {
            hyperparameters: params.clone(),
            seasonalities: params.seasonalities(),
            start_date: first.date,
            last_date: last.date,
            last_value: last.value,
            span_days: ((last.date - first.date).num_days() as f64).max(1.0),
            y_scale: obs.iter().map(|o| o.value.abs()).fold(0.0, f64::max),
            changepoints: Vec::new(),
            coefficients: Vec::new(),
            sigma: 0.0,
            mean_abs_delta: 0.0,
            volume_stats,
            recent_volume_mean,
            training_fingerprint: fingerprint::frame_hash(frame),
            n_observations: n,
        };

        let ts: Vec<f64> = obs.iter().map(|o| model.scaled_time(o.date)).collect();
        model.changepoints =
            place_changepoints(&ts, params.n_changepoints, params.changepoint_range);

        let p = model.n_features();
        let mut flat = Vec::with_capacity(n * p);
        for o in obs {
            flat.extend(model.design_row(o.date, o.volume)?);
        }
        let x = DMatrix::from_row_slice(n, p, &flat);
        let y = DVector::from_iterator(n, obs.iter().map(|o| model.transform(o.value)));

        let first_pass = solve_ridge(&x, &y, &model.penalties(WEAK_NOISE_VARIANCE))?;
        let noise_variance = residual_variance(&x, &y, &first_pass).max(MIN_NOISE_VARIANCE);
        let beta = solve_ridge(&x, &y, &model.penalties(noise_variance))?;

        model.sigma = residual_variance(&x, &y, &beta).sqrt();
        model.coefficients = beta.iter().copied().collect();
        let deltas = &model.coefficients[2..2 + model.changepoints.len()];
        model.mean_abs_delta = if deltas.is_empty() {
            0.0
        } else {
            deltas.iter().map(|d| d.abs()).sum::<f64>() / deltas.len() as f64
        };

        debug!(
            rows = n,
            features = p,
            changepoints = model.changepoints.len(),
            sigma = model.sigma,
            "fitted decomposable model"
        );
        Ok(model)
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    /// Last date of the training frame; forecasts start the day after.
    pub fn last_date(&self) -> NaiveDate {
        self.last_date
    }

    pub fn last_value(&self) -> f64 {
        self.last_value
    }

    pub fn training_fingerprint(&self) -> &DatasetHash {
        &self.training_fingerprint
    }

    pub fn n_observations(&self) -> usize {
        self.n_observations
    }

    pub fn uses_volume(&self) -> bool {
        self.volume_stats.is_some()
    }

    /// Check that the stored parameters agree with the design they were fitted on.
    /// A model read back from disk may have been edited or truncated.
    pub fn check_shape(&self) -> Result<(), ModelError> {
        let expected = self.n_features();
        if self.coefficients.len() != expected {
            return Err(ModelError::Malformed(format!(
                "{} coefficients for {expected} features",
                self.coefficients.len()
            )));
        }
        if !(self.span_days.is_finite() && self.span_days > 0.0) {
            return Err(ModelError::Malformed(format!("span_days {}", self.span_days)));
        }
        if !(self.y_scale.is_finite() && self.y_scale > 0.0) {
            return Err(ModelError::Malformed(format!("y_scale {}", self.y_scale)));
        }
        if self.changepoints.iter().any(|c| !c.is_finite()) || !self.sigma.is_finite() {
            return Err(ModelError::Malformed("non-finite changepoints or sigma".into()));
        }
        if self.volume_stats.is_some() != self.recent_volume_mean.is_some() {
            return Err(ModelError::Malformed("volume statistics are incomplete".into()));
        }
        Ok(())
    }

    /// Predict every row of a frame, using its volume column if the model needs one.
    pub fn predict_frame(&self, frame: &TimeSeriesFrame) -> Result<Vec<Prediction>, ModelError> {
        self.check_shape()?;
        let quantile = self.interval_quantile()?;
        frame
            .observations()
            .iter()
            .map(|o| self.predict_with(o.date, o.volume, quantile))
            .collect()
    }

    /// Predict the `horizon` days following the last training date.
    pub fn forecast(&self, horizon: usize) -> Result<Vec<Prediction>, ModelError> {
        if horizon == 0 {
            return Err(ModelError::EmptyHorizon);
        }
        self.check_shape()?;
        let quantile = self.interval_quantile()?;
        (1..=horizon as i64)
            .map(|i| {
                self.predict_with(
                    self.last_date + Duration::days(i),
                    self.recent_volume_mean,
                    quantile,
                )
            })
            .collect()
    }

    fn predict_with(
        &self,
        date: NaiveDate,
        volume: Option<f64>,
        quantile: f64,
    ) -> Result<Prediction, ModelError> {
        let row = self.design_row(date, volume)?;
        let z: f64 = row.iter().zip(&self.coefficients).map(|(a, b)| a * b).sum();
        let n_trend = 2 + self.changepoints.len();
        let trend: f64 = row
            .iter()
            .zip(&self.coefficients)
            .take(n_trend)
            .map(|(a, b)| a * b)
            .sum();

        let ahead = (date - self.last_date).num_days().max(0) as f64 / self.span_days;
        let sd = (self.sigma.powi(2) + (self.mean_abs_delta * ahead).powi(2)).sqrt();

        Ok(Prediction {
            date,
            yhat: self.inverse(z),
            lower: self.inverse(z - quantile * sd),
            upper: self.inverse(z + quantile * sd),
            trend: self.inverse(trend),
        })
    }

    fn interval_quantile(&self) -> Result<f64, ModelError> {
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| ModelError::InvalidHyperparameter(e.to_string()))?;
        Ok(normal.inverse_cdf(0.5 + self.hyperparameters.interval_width / 2.0))
    }

    fn scaled_time(&self, date: NaiveDate) -> f64 {
        (date - self.start_date).num_days() as f64 / self.span_days
    }

    fn transform(&self, value: f64) -> f64 {
        match self.hyperparameters.seasonality_mode {
            SeasonalityMode::Additive => value / self.y_scale,
            SeasonalityMode::Multiplicative => value.ln(),
        }
    }

    fn inverse(&self, z: f64) -> f64 {
        match self.hyperparameters.seasonality_mode {
            SeasonalityMode::Additive => z * self.y_scale,
            SeasonalityMode::Multiplicative => z.exp(),
        }
    }

    fn n_features(&self) -> usize {
        2 + self.changepoints.len()
            + self.seasonalities.iter().map(Seasonality::n_terms).sum::<usize>()
            + usize::from(self.volume_stats.is_some())
    }

    /// Column layout: intercept, slope, changepoint hinges, Fourier terms, volume.
    fn design_row(&self, date: NaiveDate, volume: Option<f64>) -> Result<Vec<f64>, ModelError> {
        let t = self.scaled_time(date);
        let mut row = Vec::with_capacity(self.n_features());
        row.push(1.0);
        row.push(t);
        row.extend(self.changepoints.iter().map(|s| (t - s).max(0.0)));

        let day = (date - NaiveDate::default()).num_days() as f64;
        for seasonality in &self.seasonalities {
            seasonality.push_terms(day, &mut row);
        }

        if let Some(stats) = self.volume_stats {
            let v = volume.ok_or(ModelError::MissingRegressor)?;
            row.push(stats.standardize(v));
        }
        Ok(row)
    }

    /// Diagonal ridge penalties for a given noise variance.
    fn penalties(&self, noise_variance: f64) -> Vec<f64> {
        let hp = &self.hyperparameters;
        let trend = noise_variance / TREND_PRIOR_SCALE.powi(2);
        let changepoint = noise_variance / hp.changepoint_prior_scale.powi(2);
        let seasonal = noise_variance / hp.seasonality_prior_scale.powi(2);

        let mut out = vec![trend, trend];
        out.extend(std::iter::repeat(changepoint).take(self.changepoints.len()));
        out.resize(self.n_features(), seasonal);
        out
    }
}

/// Evenly spaced changepoints over the first `range` share of `ts`,
/// excluding the very first point.
fn place_changepoints(ts: &[f64], requested: usize, range: f64) -> Vec<f64> {
    let history = (ts.len() as f64 * range).floor() as usize;
    if history < 2 {
        return Vec::new();
    }
    let k = requested.min(history - 1);
    (1..=k)
        .map(|j| {
            let idx = ((history - 1) as f64 * j as f64 / k as f64).round() as usize;
            ts[idx]
        })
        .collect()
}

fn solve_ridge(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    penalties: &[f64],
) -> Result<DVector<f64>, ModelError> {
    let xt = x.transpose();
    let xtx = &xt * x;
    let xty = &xt * y;
    let scale = (xtx.trace() / xtx.nrows().max(1) as f64).max(1.0);

    // escalate a diagonal jitter until the system is positive definite
    for jitter in [0.0, 1e-10, 1e-8, 1e-6] {
        let mut a = xtx.clone();
        for (i, penalty) in penalties.iter().enumerate() {
            a[(i, i)] += penalty + jitter * scale;
        }
        if let Some(cholesky) = a.cholesky() {
            return Ok(cholesky.solve(&xty));
        }
    }
    Err(ModelError::Singular)
}

fn residual_variance(x: &DMatrix<f64>, y: &DVector<f64>, beta: &DVector<f64>) -> f64 {
    let residuals = y - x * beta;
    residuals.norm_squared() / y.len().max(1) as f64
}

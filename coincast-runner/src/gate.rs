//! Deployment gate: decides whether an evaluated model may be registered.
//!
//! A model is acceptable only when `r2 >= min_r2` AND `mape <= max_mape`.
//! Non-finite metrics always fail. The decision carries every failed check so
//! callers can report why a candidate was rejected.

use coincast_core::EvaluationMetrics;
use serde::{Deserialize, Serialize};

use crate::registry::ModelVersionRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentThresholds {
    pub min_r2: f64,
    /// Percent.
    pub max_mape: f64,
}

impl Default for DeploymentThresholds {
    fn default() -> Self {
        Self {
            min_r2: 0.0,
            max_mape: 15.0,
        }
    }
}

/// Why a candidate failed the gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum GateFailure {
    R2BelowMinimum { r2: f64, min_r2: f64 },
    MapeAboveMaximum { mape: f64, max_mape: f64 },
    NonFiniteMetric { metric: String },
}

impl std::fmt::Display for GateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateFailure::R2BelowMinimum { r2, min_r2 } => {
                write!(f, "R² {r2:.4} below minimum {min_r2:.4}")
            }
            GateFailure::MapeAboveMaximum { mape, max_mape } => {
                write!(f, "MAPE {mape:.2}% above maximum {max_mape:.2}%")
            }
            GateFailure::NonFiniteMetric { metric } => write!(f, "{metric} is not finite"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub accepted: bool,
    pub failures: Vec<GateFailure>,
}

impl GateDecision {
    /// Failures joined for logs and API messages.
    pub fn summary(&self) -> String {
        if self.accepted {
            return "passed".to_string();
        }
        self.failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// What the registration stage did with one candidate.
///
/// Rejected candidates carry their metrics and failures but no record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationOutcome {
    pub decision: GateDecision,
    pub metrics: EvaluationMetrics,
    pub registered: Option<ModelVersionRecord>,
}

impl RegistrationOutcome {
    pub fn version(&self) -> Option<u32> {
        self.registered.as_ref().map(|r| r.version)
    }
}

impl DeploymentThresholds {
    pub fn validate(&self) -> Result<(), String> {
        if !self.min_r2.is_finite() {
            return Err(format!("min_r2 must be finite, got {}", self.min_r2));
        }
        if !(self.max_mape.is_finite() && self.max_mape > 0.0) {
            return Err(format!("max_mape must be positive, got {}", self.max_mape));
        }
        Ok(())
    }

    pub fn check(&self, metrics: &EvaluationMetrics) -> GateDecision {
        let mut failures = Vec::new();

        if !metrics.r2.is_finite() {
            failures.push(GateFailure::NonFiniteMetric { metric: "r2".into() });
        } else if metrics.r2 < self.min_r2 {
            failures.push(GateFailure::R2BelowMinimum {
                r2: metrics.r2,
                min_r2: self.min_r2,
            });
        }

        if !metrics.mape.is_finite() {
            failures.push(GateFailure::NonFiniteMetric { metric: "mape".into() });
        } else if metrics.mape > self.max_mape {
            failures.push(GateFailure::MapeAboveMaximum {
                mape: metrics.mape,
                max_mape: self.max_mape,
            });
        }

        GateDecision {
            accepted: failures.is_empty(),
            failures,
        }
    }
}

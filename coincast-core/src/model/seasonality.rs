use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// A periodic component expressed as a truncated Fourier series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seasonality {
    pub name: String,
    pub period_days: f64,
    pub fourier_order: usize,
}

impl Seasonality {
    pub fn new(name: impl Into<String>, period_days: f64, fourier_order: usize) -> Self {
        Self {
            name: name.into(),
            period_days,
            fourier_order,
        }
    }

    pub fn yearly() -> Self {
        Self::new("yearly", 365.25, 10)
    }

    pub fn weekly() -> Self {
        Self::new("weekly", 7.0, 3)
    }

    /// Four-year cycle between block-reward halvings.
    pub fn halving_cycle() -> Self {
        Self::new("halving_cycle", 365.25 * 4.0, 3)
    }

    /// Number of design-matrix columns this component contributes.
    pub fn n_terms(&self) -> usize {
        2 * self.fourier_order
    }

    /// Append `sin, cos` pairs for orders `1..=fourier_order` at `day`
    /// (days since the Unix epoch).
    pub fn push_terms(&self, day: f64, out: &mut Vec<f64>) {
        for k in 1..=self.fourier_order {
            let x = 2.0 * PI * k as f64 * day / self.period_days;
            out.push(x.sin());
            out.push(x.cos());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terms_repeat_every_period() {
        let weekly = Seasonality::weekly();
        let mut a = Vec::new();
        let mut b = Vec::new();
        weekly.push_terms(3.0, &mut a);
        weekly.push_terms(10.0, &mut b);
        assert_eq!(a.len(), weekly.n_terms());
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-9);
        }
    }

    #[test]
    fn halving_period() {
        assert_eq!(Seasonality::halving_cycle().period_days, 1461.0);
        assert_eq!(Seasonality::yearly().n_terms(), 20);
    }
}

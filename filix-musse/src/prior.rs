//! Exponential prior over the free rate parameters.

use filix_core::{FilixError, Result};

/// Independent exponential prior with one shared rate hyperparameter.
///
/// The density factorizes across parameters and is strictly positive only
/// when every parameter is non-negative.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialPrior {
    rate: f64,
}

impl ExponentialPrior {
    /// Builds a prior with the given exponential rate.
    pub fn new(rate: f64) -> Result<Self> {
        if !(rate > 0.0 && rate.is_finite()) {
            return Err(FilixError::InvalidInput(format!(
                "ExponentialPrior::new: rate must be positive and finite, got {}",
                rate
            )));
        }
        Ok(ExponentialPrior { rate })
    }

    /// Scales the prior from a fitted point estimate: the rate is
    /// `1 / (2 * max(mle))`, putting the prior mean at twice the largest
    /// fitted rate so the prior stays weakly informative relative to the
    /// fitted scale.
    pub fn from_mle(mle_free: &[f64]) -> Result<Self> {
        let max = mle_free.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !(max > 0.0 && max.is_finite()) {
            return Err(FilixError::InvalidInput(format!(
                "ExponentialPrior::from_mle: largest MLE rate must be positive, got {}",
                max
            )));
        }
        ExponentialPrior::new(1.0 / (2.0 * max))
    }

    /// The shared exponential rate hyperparameter.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Log prior density of a free parameter vector; negative infinity if
    /// any component is negative.
    pub fn log_density(&self, free: &[f64]) -> f64 {
        let mut sum = 0.0;
        for &x in free {
            if x < 0.0 {
                return f64::NEG_INFINITY;
            }
            sum += self.rate.ln() - self.rate * x;
        }
        sum
    }
}

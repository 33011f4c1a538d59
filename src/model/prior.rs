//! Priors for maximum-a-posteriori profile fitting

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Normal prior on a single fit parameter.
///
/// During optimization the prior contributes the penalty residual
/// `(x - mu) / std`, which is the weighted-least-squares equivalent of
/// multiplying the likelihood by `N(mu, std)`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct NormalPrior {
    pub mu: f64,
    pub std: f64,
}

impl NormalPrior {
    pub fn new(mu: f64, std: f64) -> Self {
        Self { mu, std }
    }

    /// Natural logarithm of the prior probability density at `x`.
    pub fn ln_prob(&self, x: f64) -> f64 {
        let d = (x - self.mu) / self.std;
        -0.5 * d * d - f64::ln(self.std) - 0.5 * f64::ln(std::f64::consts::TAU)
    }

    /// Penalty residual folded into the least-squares objective.
    pub fn residual(&self, x: f64) -> f64 {
        (x - self.mu) / self.std
    }

    /// Derivative of [Self::residual] with respect to `x`.
    pub fn residual_derivative(&self) -> f64 {
        self.std.recip()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn ln_prob_peaks_at_mu() {
        let prior = NormalPrior::new(2.0, 0.5);
        assert!(prior.ln_prob(2.0) > prior.ln_prob(1.5));
        assert!(prior.ln_prob(2.0) > prior.ln_prob(2.5));
        // symmetric
        assert_abs_diff_eq!(prior.ln_prob(1.0), prior.ln_prob(3.0), epsilon = 1e-12);
    }

    #[test]
    fn residual_is_zero_at_mu() {
        let prior = NormalPrior::new(10.0, 4.0);
        assert_abs_diff_eq!(prior.residual(10.0), 0.0);
        assert_abs_diff_eq!(prior.residual(14.0), 1.0);
        assert_abs_diff_eq!(prior.residual_derivative(), 0.25);
    }
}

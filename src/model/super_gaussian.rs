//! Super-Gaussian (flattened-Gaussian) profile model
//!
//! `f(x) = amplitude * exp(-0.5 * (|x - mean| / sigma)^power) + offset`
//!
//! `power = 2` reduces to the plain Gaussian; larger exponents model the
//! flat-topped profiles produced by saturated or truncated beams. The shape
//! exponent is configuration, not a fitted parameter.

use nalgebra::SVector;
use ndarray::{Array1, ArrayView1};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::gaussian::initial_guess;
use crate::model::lm::{levenberg_marquardt, LmProblem, LmSettings};
use crate::model::{required, FitModelTrait, FitParameters};

const NPARAMS: usize = 4;
const PARAMETER_NAMES: [&str; NPARAMS] = ["amplitude", "mean", "sigma", "offset"];

/// Flattened-Gaussian profile fit with a fixed shape exponent.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SuperGaussianModel {
    #[serde(default = "SuperGaussianModel::default_power")]
    pub power: f64,
    #[serde(default = "SuperGaussianModel::default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "SuperGaussianModel::default_convergence_threshold")]
    pub convergence_threshold: f64,
}

impl SuperGaussianModel {
    #[inline]
    pub fn default_power() -> f64 {
        4.0
    }

    #[inline]
    pub fn default_max_iterations() -> usize {
        100
    }

    #[inline]
    pub fn default_convergence_threshold() -> f64 {
        1e-8
    }
}

impl Default for SuperGaussianModel {
    fn default() -> Self {
        Self {
            power: Self::default_power(),
            max_iterations: Self::default_max_iterations(),
            convergence_threshold: Self::default_convergence_threshold(),
        }
    }
}

fn profile(x: f64, power: f64, params: &SVector<f64, NPARAMS>) -> f64 {
    let [amplitude, mean, sigma, offset]: [f64; NPARAMS] = (*params).into();
    let u = (x - mean).abs() / sigma;
    amplitude * f64::exp(-0.5 * u.powf(power)) + offset
}

struct SuperGaussianProblem {
    power: f64,
    len: f64,
}

impl LmProblem<NPARAMS> for SuperGaussianProblem {
    fn value(&self, x: f64, params: &SVector<f64, NPARAMS>) -> f64 {
        profile(x, self.power, params)
    }

    fn gradient(&self, x: f64, params: &SVector<f64, NPARAMS>, grad: &mut SVector<f64, NPARAMS>) {
        let [amplitude, mean, sigma, _offset]: [f64; NPARAMS] = (*params).into();
        let p = self.power;
        let dx = x - mean;
        let u = dx.abs() / sigma;
        let e = f64::exp(-0.5 * u.powf(p));
        // u^(p-1) vanishes at the peak for p > 1, keeping the gradient finite
        let up1 = if u > 0.0 { u.powf(p - 1.0) } else { 0.0 };

        grad[0] = e;
        grad[1] = amplitude * e * 0.5 * p * up1 * dx.signum() / sigma;
        grad[2] = amplitude * e * 0.5 * p * up1 * u / sigma;
        grad[3] = 1.0;
    }

    fn clamp(&self, params: &mut SVector<f64, NPARAMS>) {
        params[0] = params[0].max(0.0);
        params[2] = params[2].clamp(0.1, 2.0 * self.len);
    }
}

impl FitModelTrait for SuperGaussianModel {
    fn fit(&self, data: ArrayView1<'_, f64>) -> Result<FitParameters, Error> {
        let problem = SuperGaussianProblem {
            power: self.power,
            len: data.len() as f64,
        };
        let settings = LmSettings {
            max_iterations: self.max_iterations,
            convergence_threshold: self.convergence_threshold,
            ..Default::default()
        };

        let params = levenberg_marquardt(&problem, data, initial_guess(data), &settings)?;
        Ok(PARAMETER_NAMES.iter().copied().zip(params.iter().copied()).collect())
    }

    fn forward(
        &self,
        x: ArrayView1<'_, f64>,
        params: &FitParameters,
    ) -> Result<Array1<f64>, Error> {
        let values = SVector::<f64, NPARAMS>::from([
            required(params, "amplitude")?,
            required(params, "mean")?,
            required(params, "sigma")?,
            required(params, "offset")?,
        ]);
        Ok(x.mapv(|x| profile(x, self.power, &values)))
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        &PARAMETER_NAMES
    }

    fn method_name(&self) -> &'static str {
        "super_gaussian"
    }
}

//! Pluggable profile-fit models
//!
//! A model turns a 1D intensity profile into named [FitParameters] and can
//! evaluate its forward function for any parameter set. Models are plain
//! configuration values: `fit` returns the parameters explicitly and
//! `forward` takes them as an argument, so no working state is retained
//! between calls and a single model value may be shared across threads.

use enum_dispatch::enum_dispatch;
use ndarray::{Array1, ArrayView1};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Error;

pub mod gaussian;
pub(crate) mod lm;
pub mod prior;
pub mod super_gaussian;

pub use gaussian::GaussianModel;
pub use prior::NormalPrior;
pub use super_gaussian::SuperGaussianModel;

/// Named numeric outputs of a parametric profile fit.
///
/// A parameter set is *valid* when none of its values is NaN. Soft-rejected
/// fits are represented by setting every value to NaN rather than by an
/// error, and downstream consumers are expected to check [Self::is_valid].
/// Iteration order is deterministic (sorted by name).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FitParameters(BTreeMap<String, f64>);

impl FitParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    /// Mark the whole parameter set as unusable by setting every value to NaN.
    pub fn invalidate(&mut self) {
        for value in self.0.values_mut() {
            *value = f64::NAN;
        }
    }

    /// `true` when no value is NaN.
    pub fn is_valid(&self) -> bool {
        self.0.values().all(|v| !v.is_nan())
    }

    pub fn amplitude(&self) -> Option<f64> {
        self.get("amplitude")
    }

    pub fn mean(&self) -> Option<f64> {
        self.get("mean")
    }

    pub fn sigma(&self) -> Option<f64> {
        self.get("sigma")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, &value)| (name.as_str(), value))
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for FitParameters {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }
}

/// Capability implemented by every profile-fit model.
#[enum_dispatch]
pub trait FitModelTrait {
    /// Fit the model to a profile sampled at integer coordinates
    /// `0..data.len()`.
    fn fit(&self, data: ArrayView1<'_, f64>) -> Result<FitParameters, Error>;

    /// Evaluate the fitted profile at the given coordinates.
    fn forward(
        &self,
        x: ArrayView1<'_, f64>,
        params: &FitParameters,
    ) -> Result<Array1<f64>, Error>;

    /// Names of the parameters produced by [Self::fit].
    fn parameter_names(&self) -> &'static [&'static str];

    /// Short identifier of the model, used in persisted results.
    fn method_name(&self) -> &'static str;
}

/// Profile-fit model to use for projection fitting.
#[enum_dispatch(FitModelTrait)]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[non_exhaustive]
pub enum FitModel {
    Gaussian(GaussianModel),
    SuperGaussian(SuperGaussianModel),
}

impl FitModel {
    /// Plain Gaussian least-squares fit.
    pub fn gaussian() -> Self {
        GaussianModel::default().into()
    }

    /// Gaussian fit with normal priors derived from the initial guess
    /// (maximum-a-posteriori estimation).
    pub fn gaussian_with_priors() -> Self {
        GaussianModel {
            use_priors: true,
            ..Default::default()
        }
        .into()
    }

    /// Flattened-Gaussian fit with a fixed shape exponent.
    pub fn super_gaussian(power: f64) -> Self {
        SuperGaussianModel {
            power,
            ..Default::default()
        }
        .into()
    }
}

impl Default for FitModel {
    fn default() -> Self {
        Self::gaussian()
    }
}

pub(crate) fn required(params: &FitParameters, name: &'static str) -> Result<f64, Error> {
    params.get(name).ok_or(Error::MissingParameter { name })
}

//! 1D projection fitting: smoothing followed by model fitting

use ndarray::ArrayView1;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::{FitModel, FitModelTrait, FitParameters};
use crate::smooth::smooth_projection;

/// Fits a parametric profile model to a 1D intensity projection.
///
/// Smoothing is the only preprocessing applied here; validation of the fit
/// against noise happens one layer up, in [crate::ImageProjectionFit].
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ProjectionFit {
    #[serde(default)]
    pub model: FitModel,
    /// Gaussian smoothing width as a fraction of the projection length,
    /// in `[0, 1]`. Zero disables smoothing.
    #[serde(default = "ProjectionFit::default_relative_filter_size")]
    pub relative_filter_size: f64,
}

impl ProjectionFit {
    pub fn new(model: FitModel, relative_filter_size: f64) -> Self {
        Self {
            model,
            relative_filter_size,
        }
    }

    #[inline]
    pub fn default_relative_filter_size() -> f64 {
        0.0
    }

    /// Smooth the projection and fit the configured model to it.
    ///
    /// Fit failures from the model propagate unchanged; this layer adds no
    /// error handling of its own.
    pub fn fit_projection(&self, data: ArrayView1<'_, f64>) -> Result<FitParameters, Error> {
        if !(0.0..=1.0).contains(&self.relative_filter_size) {
            return Err(Error::FilterSizeOutOfRange(self.relative_filter_size));
        }
        let smoothed = smooth_projection(data, self.relative_filter_size);
        self.model.fit(smoothed.view())
    }
}

impl Default for ProjectionFit {
    fn default() -> Self {
        Self::new(FitModel::default(), Self::default_relative_filter_size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::gaussian_profile;
    use approx::assert_relative_eq;

    #[test]
    fn fits_without_smoothing_by_default() {
        let data = gaussian_profile(100, 20.0, 40.0, 6.0, 0.0);
        let params = ProjectionFit::default().fit_projection(data.view()).unwrap();
        assert_relative_eq!(params.mean().unwrap(), 40.0, max_relative = 1e-3);
        assert_relative_eq!(params.sigma().unwrap(), 6.0, max_relative = 1e-3);
    }

    #[test]
    fn smoothing_changes_little_for_wide_profiles() {
        let data = gaussian_profile(200, 30.0, 100.0, 15.0, 0.0);
        let plain = ProjectionFit::default().fit_projection(data.view()).unwrap();
        let smoothed = ProjectionFit::new(FitModel::default(), 0.01)
            .fit_projection(data.view())
            .unwrap();
        assert_relative_eq!(
            plain.mean().unwrap(),
            smoothed.mean().unwrap(),
            max_relative = 1e-2
        );
        // smoothing by sigma w adds w^2 to the profile variance
        assert!(smoothed.sigma().unwrap() >= plain.sigma().unwrap());
    }

    #[test]
    fn out_of_range_filter_size_is_rejected() {
        let data = gaussian_profile(50, 10.0, 25.0, 4.0, 0.0);
        let fitter = ProjectionFit::new(FitModel::default(), 1.5);
        assert!(matches!(
            fitter.fit_projection(data.view()),
            Err(Error::FilterSizeOutOfRange(_))
        ));
    }

    #[test]
    fn repeated_fits_are_identical() {
        let data = gaussian_profile(90, 25.0, 30.0, 5.0, 1.0);
        let fitter = ProjectionFit::new(FitModel::gaussian_with_priors(), 0.02);
        let first = fitter.fit_projection(data.view()).unwrap();
        let second = fitter.fit_projection(data.view()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn config_round_trips_through_serde() {
        let fitter = ProjectionFit::new(FitModel::gaussian_with_priors(), 0.01);
        let json = serde_json::to_string(&fitter).unwrap();
        let restored: ProjectionFit = serde_json::from_str(&json).unwrap();
        assert_eq!(fitter, restored);
    }
}

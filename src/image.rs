//! Image fitting via independent x/y projection fits

use itertools::izip;
use log::warn;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::{FitModel, FitModelTrait, FitParameters};
use crate::projection::ProjectionFit;

/// Result of fitting both axes of a beam image.
///
/// A rejected axis is reported as NaN in `centroid`, `rms_size` and the
/// corresponding parameter set; consumers must check for NaN before using a
/// value (see [FitParameters::is_valid]).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageFitResult {
    /// Fitted beam center, `[x, y]` in pixel coordinates.
    pub centroid: [f64; 2],
    /// Fitted rms beam size, `[sigma_x, sigma_y]` in pixels.
    pub rms_size: [f64; 2],
    /// Sum of all pixel intensities.
    pub total_intensity: f64,
    pub x_parameters: FitParameters,
    pub y_parameters: FitParameters,
    /// The image the fit was computed on.
    pub image: Array2<f64>,
    /// The model configuration used for both projections.
    pub method: FitModel,
}

/// Fits the beam centroid and size by independently fitting the x and y
/// intensity projections of an image.
///
/// Each axis's fit is checked against the residual noise level and the image
/// extent; a failing axis is soft-rejected to NaN rather than raising an
/// error.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ImageProjectionFit {
    #[serde(default = "ImageProjectionFit::default_projection_fit")]
    pub projection_fit: ProjectionFit,
    /// Minimum ratio of fitted amplitude to residual noise.
    #[serde(default = "ImageProjectionFit::default_signal_to_noise_threshold")]
    pub signal_to_noise_threshold: f64,
    /// Maximum ratio of fitted sigma to projection length.
    #[serde(default = "ImageProjectionFit::default_max_sigma_to_image_size_ratio")]
    pub max_sigma_to_image_size_ratio: f64,
}

impl ImageProjectionFit {
    /// Smoothed (1% relative width) Gaussian fit with priors, the default
    /// pipeline configuration.
    #[inline]
    pub fn default_projection_fit() -> ProjectionFit {
        ProjectionFit::new(FitModel::gaussian_with_priors(), 0.01)
    }

    #[inline]
    pub fn default_signal_to_noise_threshold() -> f64 {
        4.0
    }

    #[inline]
    pub fn default_max_sigma_to_image_size_ratio() -> f64 {
        2.0
    }

    /// Fit both projections of `image` and assemble the combined result.
    ///
    /// Hard errors are raised for zero-extent images and model-internal
    /// failures only; low-quality fits come back as NaN.
    pub fn fit_image(&self, image: ArrayView2<'_, f64>) -> Result<ImageFitResult, Error> {
        let (nrows, ncols) = image.dim();
        if nrows == 0 || ncols == 0 {
            return Err(Error::EmptyImage { nrows, ncols });
        }

        // column-wise sum -> x profile, row-wise sum -> y profile
        let x_projection = image.sum_axis(Axis(0));
        let y_projection = image.sum_axis(Axis(1));

        let mut x_parameters = self.projection_fit.fit_projection(x_projection.view())?;
        let mut y_parameters = self.projection_fit.fit_projection(y_projection.view())?;

        for (axis, projection, params) in izip!(
            ["x", "y"],
            [&x_projection, &y_projection],
            [&mut x_parameters, &mut y_parameters],
        ) {
            self.validate(axis, projection, params)?;
        }

        Ok(ImageFitResult {
            centroid: [
                x_parameters.mean().unwrap_or(f64::NAN),
                y_parameters.mean().unwrap_or(f64::NAN),
            ],
            rms_size: [
                x_parameters.sigma().unwrap_or(f64::NAN),
                y_parameters.sigma().unwrap_or(f64::NAN),
            ],
            total_intensity: image.sum(),
            x_parameters,
            y_parameters,
            image: image.to_owned(),
            method: self.projection_fit.model.clone(),
        })
    }

    /// Reject `params` to NaN when the fit is indistinguishable from noise or
    /// wider than plausible for the projection extent.
    fn validate(
        &self,
        axis: &str,
        projection: &Array1<f64>,
        params: &mut FitParameters,
    ) -> Result<(), Error> {
        let amplitude = crate::model::required(params, "amplitude")?;
        let sigma = crate::model::required(params, "sigma")?;
        let len = projection.len() as f64;

        let coordinates = Array1::from_shape_fn(projection.len(), |i| i as f64);
        let predicted = self
            .projection_fit
            .model
            .forward(coordinates.view(), params)?;
        let noise_std = (&predicted - projection).std(0.0);

        // `!(a > b)` also rejects NaN amplitudes and the all-zero case where
        // both sides are exactly zero
        if !(amplitude > noise_std * self.signal_to_noise_threshold) {
            params.invalidate();
            warn!(
                "projection in {axis} had a low amplitude relative to noise \
                 (amplitude {amplitude:.3e}, noise std {noise_std:.3e})"
            );
        } else if self.max_sigma_to_image_size_ratio * sigma > len {
            params.invalidate();
            warn!(
                "projection in {axis} was too big relative to the projection span \
                 (sigma {sigma:.3e}, span {len})"
            );
        }
        Ok(())
    }
}

impl Default for ImageProjectionFit {
    fn default() -> Self {
        Self {
            projection_fit: Self::default_projection_fit(),
            signal_to_noise_threshold: Self::default_signal_to_noise_threshold(),
            max_sigma_to_image_size_ratio: Self::default_max_sigma_to_image_size_ratio(),
        }
    }
}

//! Recursive refinement: crop to the coarse fit and fit again

use log::warn;
use ndarray::{s, ArrayView2};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::image::{ImageFitResult, ImageProjectionFit};

/// How the refinement bounding box is clipped to the image.
///
/// The historical pipeline clipped both coordinate axes against the row
/// count, which is only consistent for square images. That behavior is kept
/// as the default; [BboxClip::PerAxis] clips each axis against its own
/// extent.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum BboxClip {
    #[default]
    RowExtent,
    PerAxis,
}

/// Two-pass image fit: a coarse fit selects a bounding box of
/// `n_stds` standard deviations around the centroid, and the fit is repeated
/// on the cropped image for improved precision.
///
/// The refined centroid is reported in original-image coordinates. When the
/// coarse fit is rejected on either axis, or the bounding box collapses to an
/// empty crop, the coarse result is returned unmodified.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RecursiveImageProjectionFit {
    #[serde(default)]
    pub image_fit: ImageProjectionFit,
    /// Bounding-box half-width in units of the fitted rms size.
    #[serde(default = "RecursiveImageProjectionFit::default_n_stds")]
    pub n_stds: f64,
    #[serde(default)]
    pub bbox_clip: BboxClip,
}

impl RecursiveImageProjectionFit {
    #[inline]
    pub fn default_n_stds() -> f64 {
        4.0
    }

    pub fn fit_image(&self, image: ArrayView2<'_, f64>) -> Result<ImageFitResult, Error> {
        let coarse = self.image_fit.fit_image(image)?;

        // refinement needs a valid size estimate on both axes
        if coarse.rms_size.iter().any(|v| v.is_nan()) {
            return Ok(coarse);
        }

        let (nrows, ncols) = image.dim();
        let [cx, cy] = coarse.centroid;
        let [sx, sy] = coarse.rms_size;

        // RowExtent clips both axes against the row count but can never
        // slice past the actual column extent
        let (x_bound, y_bound) = match self.bbox_clip {
            BboxClip::RowExtent => (nrows.min(ncols), nrows),
            BboxClip::PerAxis => (ncols, nrows),
        };
        let clip = |v: f64, bound: usize| v.clamp(0.0, bound as f64) as usize;

        let x0 = clip(cx - self.n_stds * sx, x_bound);
        let x1 = clip(cx + self.n_stds * sx, x_bound);
        let y0 = clip(cy - self.n_stds * sy, y_bound);
        let y1 = clip(cy + self.n_stds * sy, y_bound);

        if x0 >= x1 || y0 >= y1 {
            warn!("refinement bounding box is empty ({x0}..{x1}, {y0}..{y1}), keeping coarse fit");
            return Ok(coarse);
        }

        let cropped = image.slice(s![y0..y1, x0..x1]);
        let refined = self.image_fit.fit_image(cropped)?;

        // report the refined centroid in original-image coordinates
        Ok(ImageFitResult {
            centroid: [
                refined.centroid[0] + x0 as f64,
                refined.centroid[1] + y0 as f64,
            ],
            ..refined
        })
    }
}

impl Default for RecursiveImageProjectionFit {
    fn default() -> Self {
        Self {
            image_fit: ImageProjectionFit::default(),
            n_stds: Self::default_n_stds(),
            bbox_clip: BboxClip::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{gaussian_image, noisy};
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::Array2;

    #[test]
    fn refined_centroid_matches_coarse() {
        let image = gaussian_image(120, 120, 1500.0, (60.0, 55.0), (6.0, 8.0));
        let fitter = RecursiveImageProjectionFit::default();
        let coarse = fitter.image_fit.fit_image(image.view()).unwrap();
        let refined = fitter.fit_image(image.view()).unwrap();

        assert_abs_diff_eq!(refined.centroid[0], coarse.centroid[0], epsilon = 1.0);
        assert_abs_diff_eq!(refined.centroid[1], coarse.centroid[1], epsilon = 1.0);
        assert_relative_eq!(refined.rms_size[0], 6.0, max_relative = 0.05);
        assert_relative_eq!(refined.rms_size[1], 8.0, max_relative = 0.05);
    }

    #[test]
    fn refined_result_is_computed_on_the_crop() {
        let image = gaussian_image(100, 100, 1000.0, (50.0, 50.0), (5.0, 5.0));
        let refined = RecursiveImageProjectionFit::default()
            .fit_image(image.view())
            .unwrap();

        // roughly 4 stds on each side of the centroid
        let (crop_rows, crop_cols) = refined.image.dim();
        assert!((38..=44).contains(&crop_rows), "crop rows: {crop_rows}");
        assert!((38..=44).contains(&crop_cols), "crop cols: {crop_cols}");
        assert!(refined.total_intensity <= image.sum());
        assert_relative_eq!(refined.total_intensity, image.sum(), max_relative = 1e-3);
    }

    #[test]
    fn nan_coarse_fit_skips_refinement() {
        let image = Array2::<f64>::zeros((48, 48));
        let fitter = RecursiveImageProjectionFit::default();
        let refined = fitter.fit_image(image.view()).unwrap();

        // the unmodified coarse result: full image, NaN everywhere
        assert_eq!(refined.image.dim(), (48, 48));
        assert!(refined.centroid.iter().all(|v| v.is_nan()));
        assert!(refined.rms_size.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn bounding_box_touching_the_edge_is_clipped() {
        // centroid close to the left and top edges
        let image = gaussian_image(90, 90, 1200.0, (10.0, 12.0), (5.0, 5.0));
        let refined = RecursiveImageProjectionFit::default()
            .fit_image(image.view())
            .unwrap();

        assert_abs_diff_eq!(refined.centroid[0], 10.0, epsilon = 1.0);
        assert_abs_diff_eq!(refined.centroid[1], 12.0, epsilon = 1.0);
    }

    #[test]
    fn row_extent_clip_truncates_wide_images() {
        // 40 rows, 200 columns: legacy clipping limits x to the row count
        let image = gaussian_image(40, 200, 2000.0, (150.0, 20.0), (6.0, 5.0));
        let fitter = RecursiveImageProjectionFit::default();
        assert_eq!(fitter.bbox_clip, BboxClip::RowExtent);

        // x range clips to [0, 40] which does not contain the beam; the
        // empty-or-degenerate crop must not panic
        let result = fitter.fit_image(image.view());
        assert!(result.is_ok());
    }

    #[test]
    fn row_extent_clip_handles_tall_images() {
        // 200 rows, 40 columns: clipping against the row count must not
        // produce x bounds past the column extent
        let image = gaussian_image(200, 40, 2000.0, (30.0, 150.0), (5.0, 6.0));
        let fitter = RecursiveImageProjectionFit::default();
        assert_eq!(fitter.bbox_clip, BboxClip::RowExtent);
        let refined = fitter.fit_image(image.view()).unwrap();

        assert_abs_diff_eq!(refined.centroid[0], 30.0, epsilon = 1.0);
        assert_abs_diff_eq!(refined.centroid[1], 150.0, epsilon = 1.0);
        // the crop stays within the image
        let (crop_rows, crop_cols) = refined.image.dim();
        assert!(crop_rows <= 200);
        assert!(crop_cols <= 40);
    }

    #[test]
    fn per_axis_clip_refines_wide_images() {
        let image = gaussian_image(40, 200, 2000.0, (150.0, 20.0), (6.0, 5.0));
        let fitter = RecursiveImageProjectionFit {
            bbox_clip: BboxClip::PerAxis,
            ..Default::default()
        };
        let refined = fitter.fit_image(image.view()).unwrap();

        assert_abs_diff_eq!(refined.centroid[0], 150.0, epsilon = 1.0);
        assert_abs_diff_eq!(refined.centroid[1], 20.0, epsilon = 1.0);
    }

    #[test]
    fn noisy_refinement_stays_on_target() {
        let clean = gaussian_image(128, 128, 3000.0, (40.0, 80.0), (6.0, 6.0));
        let image = noisy(&clean, 8.0, 3);
        let refined = RecursiveImageProjectionFit::default()
            .fit_image(image.view())
            .unwrap();

        assert_abs_diff_eq!(refined.centroid[0], 40.0, epsilon = 1.0);
        assert_abs_diff_eq!(refined.centroid[1], 80.0, epsilon = 1.0);
    }
}

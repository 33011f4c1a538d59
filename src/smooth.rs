//! Gaussian smoothing of 1D intensity profiles prior to fitting

use ndarray::{Array1, ArrayView1};

/// Kernel radius covering four standard deviations, rounded to the nearest
/// sample.
fn kernel_radius(sigma: f64) -> usize {
    (4.0 * sigma + 0.5) as usize
}

/// Reflect an out-of-range index into `[0, n)`.
///
/// Uses half-sample symmetry (`d c b a | a b c d`), so the kernel may be
/// wider than the signal itself.
fn reflect_index(mut i: i64, n: i64) -> usize {
    loop {
        if i < 0 {
            i = -i - 1;
        } else if i >= n {
            i = 2 * n - 1 - i;
        } else {
            return i as usize;
        }
    }
}

/// Convolve a 1D signal with a normalized Gaussian kernel of standard
/// deviation `sigma` samples.
///
/// Boundaries are handled by reflection. A non-positive `sigma` returns a
/// copy of the input. The input buffer is never modified.
pub fn gaussian_filter1d(data: ArrayView1<'_, f64>, sigma: f64) -> Array1<f64> {
    let n = data.len();
    if sigma <= 0.0 || n == 0 {
        return data.to_owned();
    }

    let radius = kernel_radius(sigma);
    if radius == 0 {
        return data.to_owned();
    }

    let weights: Array1<f64> = {
        let mut w = Array1::from_shape_fn(2 * radius + 1, |k| {
            let d = (k as f64 - radius as f64) / sigma;
            f64::exp(-0.5 * d * d)
        });
        w /= w.sum();
        w
    };

    Array1::from_shape_fn(n, |i| {
        weights
            .iter()
            .enumerate()
            .map(|(k, &w)| {
                let j = i as i64 + k as i64 - radius as i64;
                w * data[reflect_index(j, n as i64)]
            })
            .sum()
    })
}

/// Smooth a projection with a kernel width relative to its length.
///
/// The kernel standard deviation is `floor(len * relative_filter_size)`
/// samples. A fraction small enough to truncate to zero width leaves the
/// data unchanged.
pub fn smooth_projection(data: ArrayView1<'_, f64>, relative_filter_size: f64) -> Array1<f64> {
    let width = (data.len() as f64 * relative_filter_size) as usize;
    if width > 0 {
        gaussian_filter1d(data, width as f64)
    } else {
        data.to_owned()
    }
}

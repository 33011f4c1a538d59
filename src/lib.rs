#![doc = include_str!("../README.md")]

mod error;
pub use error::Error;

mod smooth;
pub use smooth::{gaussian_filter1d, smooth_projection};

pub mod model;
pub use model::{
    FitModel, FitModelTrait, FitParameters, GaussianModel, NormalPrior, SuperGaussianModel,
};

mod projection;
pub use projection::ProjectionFit;

mod image;
pub use image::{ImageFitResult, ImageProjectionFit};

mod recursive;
pub use recursive::{BboxClip, RecursiveImageProjectionFit};

pub mod store;


pub use ndarray;

/// Error returned from fitting and persistence entry points.
///
/// Low-quality fits are not errors: they are reported as NaN-filled
/// [crate::FitParameters] (see [crate::ImageProjectionFit]). The variants here
/// cover structurally unusable input, model-contract violations and I/O
/// failures only.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("projection length {actual} is smaller than the minimum required length {minimum}")]
    ShortProjection { actual: usize, minimum: usize },

    #[error("image has zero extent: {nrows} rows x {ncols} columns")]
    EmptyImage { nrows: usize, ncols: usize },

    #[error("relative filter size {0} is outside [0, 1]")]
    FilterSizeOutOfRange(f64),

    #[error("fit parameters are missing \"{name}\" required by the model")]
    MissingParameter { name: &'static str },

    #[error("normal equations are singular, no finite parameter set found")]
    SingularFit,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("tree (de)serialization failed: {0}")]
    Yaml(#[from] serde_yml::Error),
}

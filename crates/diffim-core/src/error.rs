use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiffimError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Not implemented: {0}")]
    Unimplemented(String),

    #[error("Numerical failure: {0}")]
    NumericalFailure(String),

    #[error("Unable to find any footprints for PSF matching (final threshold {threshold:.3})")]
    NoUsableRegion { threshold: f64 },

    #[error("Image dimensions differ: {expected_width}x{expected_height} vs {width}x{height}")]
    DimensionMismatch {
        expected_width: usize,
        expected_height: usize,
        width: usize,
        height: usize,
    },

    #[error("Invalid raw image file: {0}")]
    InvalidRaw(String),
}

pub type Result<T> = std::result::Result<T, DiffimError>;

pub mod consts;
pub mod convolve;
pub mod detection;
pub mod dia_source;
pub mod error;
pub mod io;
pub mod kernel;
pub mod mask;
pub mod masked_image;
pub mod pipeline;
pub mod psf_match;
pub mod selection;
pub mod stats;
pub mod subtract;

pub mod image_io;
pub mod raw;

pub use image_io::{load_image, load_mask, load_masked_image, save_image, save_png, save_tiff};
pub use raw::{load_raw, save_raw};

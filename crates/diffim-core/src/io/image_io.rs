use std::path::Path;

use image::{GrayImage, ImageFormat, Luma};
use ndarray::Array2;
use num_traits::Float;

use crate::error::{DiffimError, Result};
use crate::io::raw::{load_raw, save_raw};
use crate::mask::{MaskPixel, BAD};
use crate::masked_image::MaskedImage;

/// Load a grayscale image file, scaled to [0, 1].
pub fn load_image(path: &Path) -> Result<Array2<f32>> {
    let img = image::open(path)?;
    let gray = img.to_luma16();
    let (w, h) = gray.dimensions();
    let mut data = Array2::<f32>::zeros((h as usize, w as usize));

    for row in 0..h as usize {
        for col in 0..w as usize {
            let pixel = gray.get_pixel(col as u32, row as u32);
            data[[row, col]] = pixel.0[0] as f32 / 65535.0;
        }
    }
    Ok(data)
}

/// Load a mask image: every nonzero pixel becomes `BAD`.
pub fn load_mask(path: &Path) -> Result<Array2<MaskPixel>> {
    let gray = image::open(path)?.to_luma8();
    let (w, h) = gray.dimensions();
    Ok(Array2::from_shape_fn((h as usize, w as usize), |(row, col)| {
        if gray.get_pixel(col as u32, row as u32).0[0] != 0 {
            BAD
        } else {
            0
        }
    }))
}

/// Load a masked image. Raw files carry all three planes; anything else is
/// read as a plain image with an empty mask and zero variance.
pub fn load_masked_image(path: &Path) -> Result<MaskedImage<f32>> {
    if is_raw(path) {
        return load_raw(path);
    }
    Ok(MaskedImage::from_image(load_image(path)?, 0.0))
}

/// Linear min/max stretch of the finite pixels to [0, 1]. Non-finite pixels map to 0.
pub fn stretch<T: Float>(data: &Array2<T>) -> Array2<f32> {
    let (lo, hi) = data
        .iter()
        .filter_map(|v| v.to_f64())
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    let range = hi - lo;
    data.mapv(|v| match v.to_f64() {
        Some(v) if v.is_finite() && range > 0.0 => ((v - lo) / range) as f32,
        _ => 0.0,
    })
}

/// Save a stretched preview as 16-bit grayscale TIFF.
pub fn save_tiff<T: Float>(data: &Array2<T>, path: &Path) -> Result<()> {
    let scaled = stretch(data);
    let (h, w) = scaled.dim();
    let pixels: Vec<u16> = scaled
        .iter()
        .map(|v| (v.clamp(0.0, 1.0) * 65535.0) as u16)
        .collect();

    let img = image::ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels)
        .ok_or_else(|| DiffimError::InvalidParameter("buffer size mismatch".into()))?;
    img.save_with_format(path, ImageFormat::Tiff)?;
    Ok(())
}

/// Save a stretched preview as 8-bit grayscale PNG.
pub fn save_png<T: Float>(data: &Array2<T>, path: &Path) -> Result<()> {
    let scaled = stretch(data);
    let (h, w) = scaled.dim();

    let mut img = GrayImage::new(w as u32, h as u32);
    for ((row, col), v) in scaled.indexed_iter() {
        let val = (v.clamp(0.0, 1.0) * 255.0) as u8;
        img.put_pixel(col as u32, row as u32, Luma([val]));
    }

    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Save a masked image, choosing the format from the file extension.
///
/// `.raw` keeps exact values and all planes; TIFF and PNG write a stretched
/// preview of the image plane. Unknown extensions fall back to TIFF.
pub fn save_image(image: &MaskedImage<f32>, path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("raw") => save_raw(image, path),
        Some("png") => save_png(&image.image, path),
        _ => save_tiff(&image.image, path),
    }
}

fn is_raw(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("raw")
}

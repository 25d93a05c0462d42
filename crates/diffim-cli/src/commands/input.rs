use std::path::Path;

use anyhow::{bail, Context, Result};
use diffim_core::io::{load_image, load_mask, load_raw};
use diffim_core::masked_image::MaskedImage;
use diffim_core::pipeline::{DiffimConfig, VarianceModel};
use tracing::debug;

/// Read a TOML config, or fall back to the defaults.
pub fn load_config(path: Option<&Path>) -> Result<DiffimConfig> {
    let Some(path) = path else {
        return Ok(DiffimConfig::default());
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("Invalid config {}", path.display()))
}

/// Load an input image with optional mask file.
///
/// Raw files keep their own variance plane; other formats get one from
/// `model`.
pub fn load_input(
    path: &Path,
    mask: Option<&Path>,
    model: &VarianceModel,
) -> Result<MaskedImage<f32>> {
    let is_raw = path.extension().and_then(|e| e.to_str()) == Some("raw");
    let mut image = if is_raw {
        load_raw(path).with_context(|| format!("Failed to read {}", path.display()))?
    } else {
        let data = load_image(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let mut image = MaskedImage::from_image(data, 0.0);
        image.variance = model.variance_plane(&image.image);
        image
    };

    if let Some(mask_path) = mask {
        let bits = load_mask(mask_path)
            .with_context(|| format!("Failed to read mask {}", mask_path.display()))?;
        if bits.dim() != image.dim() {
            bail!(
                "Mask {} is {}x{}, image is {}x{}",
                mask_path.display(),
                bits.ncols(),
                bits.nrows(),
                image.width(),
                image.height()
            );
        }
        image.mask.zip_mut_with(&bits, |m, &b| *m |= b);
    }
    debug!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        masked = mask.is_some(),
        "Input loaded"
    );
    Ok(image)
}


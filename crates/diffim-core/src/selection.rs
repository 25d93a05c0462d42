//! Iterative search for clean footprints to fit kernels on.

use num_traits::Float;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::consts::{
    DEFAULT_DET_THRESHOLD, DEFAULT_DET_THRESHOLD_MIN, DEFAULT_DET_THRESHOLD_SCALING,
    DEFAULT_FP_GROW_KSIZE, DEFAULT_FP_NPIX_MAX, DEFAULT_FP_NPIX_MIN, DEFAULT_MIN_CLEAN_FP,
};
use crate::detection::{detect_footprints, footprint_mask_bits, Footprint, Threshold, ThresholdType};
use crate::error::{DiffimError, Result};
use crate::mask::{plane_names, MaskPixel};
use crate::masked_image::MaskedImage;

/// Parameters of the footprint search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FootprintConfig {
    /// Minimum pixel count of a detection.
    #[serde(default = "default_fp_npix_min", alias = "fpNpixMin")]
    pub fp_npix_min: usize,
    /// Detections with more pixels than this are discarded.
    #[serde(default = "default_fp_npix_max", alias = "fpNpixMax")]
    pub fp_npix_max: usize,
    /// Growth in units of the larger kernel dimension.
    #[serde(default = "default_fp_grow_ksize", alias = "fpGrowKsize")]
    pub fp_grow_ksize: f64,
    /// Number of clean footprints wanted.
    #[serde(default = "default_min_clean_fp", alias = "minCleanFp")]
    pub min_clean_fp: usize,
    /// Starting detection threshold.
    #[serde(default = "default_det_threshold", alias = "detThreshold")]
    pub det_threshold: f64,
    /// Threshold multiplier applied after every pass, in (0, 1).
    #[serde(default = "default_det_threshold_scaling", alias = "detThresholdScaling")]
    pub det_threshold_scaling: f64,
    /// The search stops once the threshold is no longer above this.
    #[serde(default = "default_det_threshold_min", alias = "detThresholdMin")]
    pub det_threshold_min: f64,
    #[serde(default, alias = "detThresholdType")]
    pub det_threshold_type: ThresholdType,
}

fn default_fp_npix_min() -> usize {
    DEFAULT_FP_NPIX_MIN
}
fn default_fp_npix_max() -> usize {
    DEFAULT_FP_NPIX_MAX
}
fn default_fp_grow_ksize() -> f64 {
    DEFAULT_FP_GROW_KSIZE
}
fn default_min_clean_fp() -> usize {
    DEFAULT_MIN_CLEAN_FP
}
fn default_det_threshold() -> f64 {
    DEFAULT_DET_THRESHOLD
}
fn default_det_threshold_scaling() -> f64 {
    DEFAULT_DET_THRESHOLD_SCALING
}
fn default_det_threshold_min() -> f64 {
    DEFAULT_DET_THRESHOLD_MIN
}

impl Default for FootprintConfig {
    fn default() -> Self {
        Self {
            fp_npix_min: DEFAULT_FP_NPIX_MIN,
            fp_npix_max: DEFAULT_FP_NPIX_MAX,
            fp_grow_ksize: DEFAULT_FP_GROW_KSIZE,
            min_clean_fp: DEFAULT_MIN_CLEAN_FP,
            det_threshold: DEFAULT_DET_THRESHOLD,
            det_threshold_scaling: DEFAULT_DET_THRESHOLD_SCALING,
            det_threshold_min: DEFAULT_DET_THRESHOLD_MIN,
            det_threshold_type: ThresholdType::default(),
        }
    }
}

impl FootprintConfig {
    /// Check that the threshold loop is bounded and the quota is meaningful.
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(DiffimError::InvalidParameter(msg));
        if self.min_clean_fp < 1 {
            return bad("min_clean_fp must be at least 1".into());
        }
        if !(self.det_threshold_scaling > 0.0 && self.det_threshold_scaling < 1.0) {
            return bad(format!(
                "det_threshold_scaling must be in (0, 1), got {}",
                self.det_threshold_scaling
            ));
        }
        if !(self.det_threshold_min > 0.0 && self.det_threshold.is_finite()) {
            return bad(format!(
                "detection thresholds must be finite with a positive floor (start {}, floor {})",
                self.det_threshold, self.det_threshold_min
            ));
        }
        if !(self.fp_grow_ksize >= 0.0 && self.fp_grow_ksize.is_finite()) {
            return bad(format!(
                "fp_grow_ksize must be finite and non-negative, got {}",
                self.fp_grow_ksize
            ));
        }
        Ok(())
    }

    /// Pixels each footprint is grown by for a `kernel_cols x kernel_rows` kernel.
    pub fn grow_pixels(&self, kernel_cols: usize, kernel_rows: usize) -> usize {
        (self.fp_grow_ksize * kernel_cols.max(kernel_rows) as f64) as usize
    }
}

/// Clean footprints found by the search.
#[derive(Clone, Debug)]
pub struct FootprintSelection {
    pub footprints: Vec<Footprint>,
    /// Threshold of the pass that produced `footprints`.
    pub threshold: f64,
    /// Number of detection passes run.
    pub passes: usize,
}

/// Why a detected footprint was not kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    TooManyPixels { npix: usize, max: usize },
    OffImage,
    MaskedInTemplate(MaskPixel),
    MaskedInScience(MaskPixel),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooManyPixels { npix, max } => {
                write!(f, "footprint has too many pix: {npix} (max = {max})")
            }
            Self::OffImage => write!(f, "grown footprint extends beyond the image"),
            Self::MaskedInTemplate(bits) => {
                write!(f, "bad pix in image to convolve: {:?}", plane_names(*bits))
            }
            Self::MaskedInScience(bits) => {
                write!(f, "bad pix in image not to convolve: {:?}", plane_names(*bits))
            }
        }
    }
}

/// Search `to_convolve` for footprints suitable for kernel fitting.
///
/// Runs detection at a decaying threshold until `min_clean_fp` clean
/// footprints are found or the threshold falls to `det_threshold_min`. Every
/// pass starts from an empty list, so the result comes from a single
/// threshold. A short but non-empty list is returned as-is; an empty one is
/// [`DiffimError::NoUsableRegion`].
pub fn select_footprints_for_psf_matching<T: Float>(
    to_convolve: &MaskedImage<T>,
    to_not_convolve: &MaskedImage<T>,
    config: &FootprintConfig,
    kernel_cols: usize,
    kernel_rows: usize,
) -> Result<FootprintSelection> {
    config.validate()?;
    to_convolve.check_same_dimensions(to_not_convolve)?;
    if kernel_cols < 1 || kernel_rows < 1 {
        return Err(DiffimError::InvalidParameter(format!(
            "kernel rows and cols must be positive (got {kernel_cols}x{kernel_rows})"
        )));
    }

    let grow_pix = config.grow_pixels(kernel_cols, kernel_rows);
    let mut threshold = config.det_threshold;
    let mut used_threshold = threshold;
    let mut clean: Vec<Footprint> = Vec::new();
    let mut passes = 0;

    while clean.len() < config.min_clean_fp && threshold > config.det_threshold_min {
        passes += 1;
        used_threshold = threshold;
        clean.clear();

        let detections = detect_footprints(
            to_convolve,
            &Threshold::new(threshold, config.det_threshold_type),
            config.fp_npix_min,
        );
        debug!(
            count = detections.len(),
            threshold, "Found total footprints above threshold"
        );

        for footprint in &detections {
            match vet_footprint(footprint, to_convolve, to_not_convolve, config, grow_pix) {
                Ok(grown) => clean.push(grown),
                Err(reason) => {
                    let bbox = footprint.bbox();
                    debug!(x0 = bbox.x0, y0 = bbox.y0, "Footprint rejected: {reason}");
                }
            }
        }

        threshold *= config.det_threshold_scaling;
    }

    if clean.is_empty() {
        return Err(DiffimError::NoUsableRegion {
            threshold: used_threshold,
        });
    }
    if clean.len() < config.min_clean_fp {
        warn!(
            found = clean.len(),
            wanted = config.min_clean_fp,
            "Fewer clean footprints than requested"
        );
    }
    info!(
        count = clean.len(),
        threshold = used_threshold,
        passes,
        "Found clean footprints"
    );

    Ok(FootprintSelection {
        footprints: clean,
        threshold: used_threshold,
        passes,
    })
}

/// Size cut, growth, extraction check and mask check for one detection.
fn vet_footprint<T: Float>(
    footprint: &Footprint,
    to_convolve: &MaskedImage<T>,
    to_not_convolve: &MaskedImage<T>,
    config: &FootprintConfig,
    grow_pix: usize,
) -> std::result::Result<Footprint, Rejection> {
    if footprint.npix() > config.fp_npix_max {
        return Err(Rejection::TooManyPixels {
            npix: footprint.npix(),
            max: config.fp_npix_max,
        });
    }

    let grown = footprint.grow(grow_pix, false);
    let bbox = grown.bbox();
    trace!(
        x0 = bbox.x0,
        y0 = bbox.y0,
        x1 = bbox.x1(),
        y1 = bbox.y1(),
        grow = grow_pix,
        "Footprint grown"
    );

    if to_convolve.local_origin(&bbox).is_err() || to_not_convolve.local_origin(&bbox).is_err() {
        return Err(Rejection::OffImage);
    }

    let bits = footprint_mask_bits(to_convolve, &grown);
    if bits != 0 {
        return Err(Rejection::MaskedInTemplate(bits));
    }
    let bits = footprint_mask_bits(to_not_convolve, &grown);
    if bits != 0 {
        return Err(Rejection::MaskedInScience(bits));
    }
    Ok(grown)
}

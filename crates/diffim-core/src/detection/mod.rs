pub mod components;
pub mod footprint;
pub mod threshold;

use num_traits::Float;
use tracing::trace;

use crate::masked_image::MaskedImage;

pub use footprint::{footprint_counts, footprint_mask_bits, Footprint, Peak, Span};
pub use threshold::{compute_mean_stddev, threshold_mask, Polarity, Threshold, ThresholdType};

use components::connected_regions;

/// Find connected regions above `threshold` with at least `npix_min` pixels.
///
/// Footprints are in the parent coordinates of `image` (its `x0/y0` origin
/// is applied). The peak is the most extreme pixel in the threshold's
/// polarity.
pub fn detect_footprints<T: Float>(
    image: &MaskedImage<T>,
    threshold: &Threshold,
    npix_min: usize,
) -> Vec<Footprint> {
    let mask = threshold_mask(image, threshold);
    let sign = match threshold.polarity {
        Polarity::Positive => 1.0,
        Polarity::Negative => -1.0,
    };

    let footprints: Vec<Footprint> = connected_regions(&mask)
        .into_iter()
        .filter(|region| region.len() >= npix_min.max(1))
        .map(|region| {
            let mut peak: Option<Peak> = None;
            let pixels = region
                .iter()
                .map(|&(row, col)| {
                    let v = image.image[[row, col]].to_f64().unwrap_or(f64::NAN);
                    let (x, y) = (image.x0 + col as i64, image.y0 + row as i64);
                    if peak.map_or(true, |p| sign * v > sign * p.value) {
                        peak = Some(Peak { x, y, value: v });
                    }
                    (x, y)
                })
                .collect();
            let peak = peak.unwrap_or(Peak {
                x: image.x0,
                y: image.y0,
                value: f64::NAN,
            });
            Footprint::from_pixels(pixels, peak)
        })
        .collect();

    trace!(
        threshold = threshold.value,
        kind = %threshold.kind,
        count = footprints.len(),
        "Detected footprints"
    );
    footprints
}

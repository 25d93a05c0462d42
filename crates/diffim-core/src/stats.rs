//! Quality statistics of difference images.

use num_traits::Float;
use serde::Serialize;

use crate::detection::Footprint;
use crate::mask::MaskPixel;
use crate::masked_image::MaskedImage;

/// Moments of the normalized residual `pixel / sqrt(variance)`.
///
/// For a well-matched difference of noise-dominated images the mean is
/// close to 0 and the variance close to 1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ImageStatistics {
    pub count: usize,
    pub mean: f64,
    pub variance: f64,
    pub rms: f64,
}

impl ImageStatistics {
    /// Statistics over every pixel with no bit of `bad_mask` set.
    pub fn compute<T: Float>(diff: &MaskedImage<T>, bad_mask: MaskPixel) -> Self {
        let samples = diff
            .image
            .iter()
            .zip(diff.mask.iter())
            .zip(diff.variance.iter())
            .filter(|&((_, &m), _)| m & bad_mask == 0)
            .filter_map(|((&v, _), &var)| normalized(v, var));
        Self::from_samples(samples)
    }

    /// Statistics over the pixels of `footprint` that lie inside `diff`.
    pub fn compute_in_footprint<T: Float>(
        diff: &MaskedImage<T>,
        footprint: &Footprint,
        bad_mask: MaskPixel,
    ) -> Self {
        let bbox = diff.bbox();
        let samples = footprint
            .pixels()
            .filter(|&(x, y)| bbox.contains(x, y))
            .filter_map(|(x, y)| {
                let idx = [(y - diff.y0) as usize, (x - diff.x0) as usize];
                if diff.mask[idx] & bad_mask != 0 {
                    return None;
                }
                normalized(diff.image[idx], diff.variance[idx])
            });
        Self::from_samples(samples)
    }

    fn from_samples(samples: impl Iterator<Item = f64>) -> Self {
        let (mut n, mut sum, mut sum_sq) = (0usize, 0.0f64, 0.0f64);
        for s in samples {
            n += 1;
            sum += s;
            sum_sq += s * s;
        }
        if n == 0 {
            return Self::default();
        }
        let mean = sum / n as f64;
        let variance = if n > 1 {
            ((sum_sq - n as f64 * mean * mean) / (n - 1) as f64).max(0.0)
        } else {
            0.0
        };
        Self {
            count: n,
            mean,
            variance,
            rms: (sum_sq / n as f64).sqrt(),
        }
    }
}

fn normalized<T: Float>(value: T, variance: T) -> Option<f64> {
    let v = value.to_f64()?;
    let var = variance.to_f64()?;
    (v.is_finite() && var.is_finite() && var > 0.0).then(|| v / var.sqrt())
}

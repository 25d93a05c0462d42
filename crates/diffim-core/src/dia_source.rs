//! Vetting of sources detected on a difference image.
//!
//! A real transient leaves a compact footprint dominated by pixels of one
//! sign. Subtraction artifacts (dipoles from misregistration, residuals on
//! masked pixels) fail one of the ratio tests in [`DiaSourceAnalyst::test_source`].

use ndarray::ArrayView2;
use num_traits::Float;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::detection::{detect_footprints, footprint_counts, Footprint, Polarity, Threshold};
use crate::mask::{plane_bit_mask, MaskPixel, DETECTED, DETECTED_NEGATIVE};
use crate::masked_image::MaskedImage;

/// Tolerances of the source tests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiaSourceConfig {
    /// Mask planes that make a pixel unusable.
    #[serde(alias = "srcBadMaskPlanes")]
    pub bad_mask_planes: Vec<String>,
    /// Largest allowed fraction of masked pixels.
    #[serde(alias = "fBadPixels")]
    pub f_bad_pixels: f64,
    /// Minimum fraction of flux in correct-polarity pixels.
    #[serde(alias = "fluxPolarityRatio")]
    pub flux_polarity_ratio: f64,
    /// Minimum fraction of correct-polarity pixels among unmasked ones.
    #[serde(alias = "nPolarityRatio")]
    pub n_polarity_ratio: f64,
    /// Minimum ratio of correct-polarity pixels to those plus masked ones.
    #[serde(alias = "nMaskedRatio")]
    pub n_masked_ratio: f64,
    /// Minimum fraction of correct-polarity pixels among all pixels.
    #[serde(alias = "nGoodRatio")]
    pub n_good_ratio: f64,
}

impl Default for DiaSourceConfig {
    fn default() -> Self {
        Self {
            bad_mask_planes: ["NO_DATA", "EDGE", "SAT", "BAD"]
                .into_iter()
                .map(String::from)
                .collect(),
            f_bad_pixels: 0.1,
            flux_polarity_ratio: 0.75,
            n_polarity_ratio: 0.7,
            n_masked_ratio: 0.6,
            n_good_ratio: 0.5,
        }
    }
}

/// Unmasked pixel counts and flux sums split by sign. Zero counts as positive.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PolarityCounts {
    pub n_pos: usize,
    pub n_neg: usize,
    pub flux_pos: f64,
    pub flux_neg: f64,
}

/// A source found on a difference image.
#[derive(Clone, Debug)]
pub struct DiaSource {
    pub footprint: Footprint,
    pub polarity: Polarity,
    /// Sum of difference pixels under the footprint.
    pub flux: f64,
    /// Whether the source passed every test.
    pub accepted: bool,
}

pub struct DiaSourceAnalyst {
    config: DiaSourceConfig,
    bit_mask: MaskPixel,
}

impl DiaSourceAnalyst {
    pub fn new(config: DiaSourceConfig) -> Self {
        let bit_mask = plane_bit_mask(&config.bad_mask_planes);
        Self { config, bit_mask }
    }

    pub fn config(&self) -> &DiaSourceConfig {
        &self.config
    }

    /// Bits of the configured bad planes.
    pub fn bit_mask(&self) -> MaskPixel {
        self.bit_mask
    }

    /// Pixels flagged `(DETECTED, DETECTED_NEGATIVE)`.
    pub fn count_detected(&self, mask: ArrayView2<MaskPixel>) -> (usize, usize) {
        mask.iter().fold((0, 0), |(p, n), &m| {
            (
                p + usize::from(m & DETECTED != 0),
                n + usize::from(m & DETECTED_NEGATIVE != 0),
            )
        })
    }

    pub fn count_masked(&self, mask: ArrayView2<MaskPixel>) -> usize {
        mask.iter().filter(|&&m| m & self.bit_mask != 0).count()
    }

    pub fn count_polarity<T: Float>(
        &self,
        mask: ArrayView2<MaskPixel>,
        pixels: ArrayView2<T>,
    ) -> PolarityCounts {
        let mut counts = PolarityCounts::default();
        for (&m, &p) in mask.iter().zip(pixels.iter()) {
            if m & self.bit_mask != 0 {
                continue;
            }
            let v = p.to_f64().unwrap_or(f64::NAN);
            if v >= 0.0 {
                counts.n_pos += 1;
                counts.flux_pos += v;
            } else {
                counts.n_neg += 1;
                counts.flux_neg += v;
            }
        }
        counts
    }

    /// Decide whether a source of total `flux` over `sub_image` is real.
    ///
    /// Tests, in order: masked fraction, flux polarity, polarity count,
    /// correct-polarity vs masked, correct-polarity vs all pixels. The sign
    /// of `flux` selects which polarity is "correct". A ratio that cannot be
    /// formed (zero denominator) fails its test.
    pub fn test_source<T: Float>(&self, flux: f64, sub_image: &MaskedImage<T>) -> bool {
        let n_pixels = sub_image.width() * sub_image.height();
        if n_pixels == 0 {
            return false;
        }
        let counts = self.count_polarity(sub_image.mask.view(), sub_image.image.view());
        let (n_det_pos, n_det_neg) = self.count_detected(sub_image.mask.view());
        let n_masked = self.count_masked(sub_image.mask.view());
        let PolarityCounts {
            n_pos,
            n_neg,
            flux_pos,
            flux_neg,
        } = counts;

        let f_masked = n_masked as f64 / n_pixels as f64;
        if f_masked > self.config.f_bad_pixels {
            debug!(
                f_masked,
                tolerance = self.config.f_bad_pixels,
                "Candidate rejected: too many bad pixels"
            );
            return false;
        }

        let ratio = |num: f64, den: f64| if den > 0.0 { num / den } else { f64::NAN };
        let total_flux = flux_pos + flux_neg.abs();
        let (n_good, flux_good) = if flux > 0.0 {
            (n_pos, flux_pos)
        } else {
            (n_neg, flux_neg.abs())
        };
        let flux_ratio = ratio(flux_good, total_flux);
        let n_good_ratio = n_good as f64 / n_pixels as f64;
        let mask_ratio = ratio(n_good as f64, (n_good + n_masked) as f64);
        let n_pol_ratio = ratio(n_good as f64, (n_pos + n_neg) as f64);

        // NaN never satisfies `>=`, so degenerate ratios reject.
        if !(flux_ratio >= self.config.flux_polarity_ratio) {
            debug!(
                flux_ratio,
                tolerance = self.config.flux_polarity_ratio,
                flux_pos,
                flux_neg,
                "Candidate rejected: flux polarity"
            );
            return false;
        }
        if !(n_pol_ratio >= self.config.n_polarity_ratio) {
            debug!(
                n_pol_ratio,
                tolerance = self.config.n_polarity_ratio,
                n_pos,
                n_neg,
                "Candidate rejected: polarity count"
            );
            return false;
        }
        if !(mask_ratio >= self.config.n_masked_ratio) {
            debug!(
                mask_ratio,
                tolerance = self.config.n_masked_ratio,
                n_pos,
                n_neg,
                n_masked,
                "Candidate rejected: unmasked count"
            );
            return false;
        }
        if !(n_good_ratio >= self.config.n_good_ratio) {
            debug!(
                n_good_ratio,
                tolerance = self.config.n_good_ratio,
                n_pos,
                n_neg,
                n_pixels,
                "Candidate rejected: good pixel count"
            );
            return false;
        }

        debug!(
            flux,
            n_pos, n_neg, n_pixels, n_det_pos, n_det_neg, flux_pos, flux_neg, "Candidate OK"
        );
        true
    }

    /// Detect positive and negative sources on `diff` and vet each one.
    ///
    /// `threshold` is applied as-is for positive detections and mirrored for
    /// negative ones. Detected pixels are flagged `DETECTED` or
    /// `DETECTED_NEGATIVE` in the mask of `diff` before vetting.
    pub fn detect_dia_sources<T: Float>(
        &self,
        diff: &mut MaskedImage<T>,
        threshold: &Threshold,
        npix_min: usize,
    ) -> Vec<DiaSource> {
        let positive = Threshold {
            polarity: Polarity::Positive,
            ..*threshold
        };
        let found: Vec<(Footprint, Polarity)> = detect_footprints(diff, &positive, npix_min)
            .into_iter()
            .map(|fp| (fp, Polarity::Positive))
            .chain(
                detect_footprints(diff, &positive.negative(), npix_min)
                    .into_iter()
                    .map(|fp| (fp, Polarity::Negative)),
            )
            .collect();

        for (footprint, polarity) in &found {
            let bit = match polarity {
                Polarity::Positive => DETECTED,
                Polarity::Negative => DETECTED_NEGATIVE,
            };
            for (x, y) in footprint.pixels() {
                diff.mask[[(y - diff.y0) as usize, (x - diff.x0) as usize]] |= bit;
            }
        }

        let sources: Vec<DiaSource> = found
            .into_iter()
            .map(|(footprint, polarity)| {
                let (flux, _) = footprint_counts(diff, &footprint);
                let accepted = diff
                    .sub_image(&footprint.bbox())
                    .map(|sub| self.test_source(flux, &sub))
                    .unwrap_or(false);
                DiaSource {
                    footprint,
                    polarity,
                    flux,
                    accepted,
                }
            })
            .collect();

        info!(
            total = sources.len(),
            accepted = sources.iter().filter(|s| s.accepted).count(),
            "DIA sources vetted"
        );
        sources
    }
}

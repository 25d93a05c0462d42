mod common;

use ndarray::Array2;

use diffim_core::detection::{Polarity, Threshold, ThresholdType};
use diffim_core::dia_source::{DiaSourceAnalyst, DiaSourceConfig};
use diffim_core::mask::{BAD, DETECTED, DETECTED_NEGATIVE};
use diffim_core::masked_image::MaskedImage;

use common::add_gaussian;

fn analyst() -> DiaSourceAnalyst {
    DiaSourceAnalyst::new(DiaSourceConfig::default())
}

fn patch(values: impl Fn(usize, usize) -> f64) -> MaskedImage<f64> {
    MaskedImage::from_image(Array2::from_shape_fn((10, 10), |(r, c)| values(r, c)), 1.0)
}

#[test]
fn test_detects_and_accepts_both_polarities() {
    let mut image = Array2::<f64>::zeros((64, 64));
    add_gaussian(&mut image, 16, 16, 1.0, 1.5);
    add_gaussian(&mut image, 48, 48, -1.0, 1.5);
    let mut diff = MaskedImage::from_image(image, 1e-4);

    let threshold = Threshold::new(5.0, ThresholdType::Variance);
    let sources = analyst().detect_dia_sources(&mut diff, &threshold, 5);

    assert_eq!(sources.len(), 2);
    let positive = sources
        .iter()
        .find(|s| s.polarity == Polarity::Positive)
        .expect("positive source");
    let negative = sources
        .iter()
        .find(|s| s.polarity == Polarity::Negative)
        .expect("negative source");

    assert_eq!((positive.footprint.peak().x, positive.footprint.peak().y), (16, 16));
    assert_eq!((negative.footprint.peak().x, negative.footprint.peak().y), (48, 48));
    assert!(positive.flux > 0.0);
    assert!(negative.flux < 0.0);
    assert!(positive.accepted);
    assert!(negative.accepted);

    assert_ne!(diff.mask[[16, 16]] & DETECTED, 0);
    assert_eq!(diff.mask[[16, 16]] & DETECTED_NEGATIVE, 0);
    assert_ne!(diff.mask[[48, 48]] & DETECTED_NEGATIVE, 0);
    assert_eq!(diff.mask[[0, 0]], 0);

    let (n_pos, n_neg) = analyst().count_detected(diff.mask.view());
    assert_eq!(n_pos, positive.footprint.npix());
    assert_eq!(n_neg, negative.footprint.npix());
}

#[test]
fn test_quiet_difference_has_no_sources() {
    let mut diff = MaskedImage::from_image(Array2::from_elem((32, 32), 0.001), 1e-4);
    let threshold = Threshold::new(5.0, ThresholdType::Variance);
    assert!(analyst().detect_dia_sources(&mut diff, &threshold, 5).is_empty());
    assert!(diff.mask.iter().all(|&m| m == 0));
}

#[test]
fn test_clean_source_passes() {
    assert!(analyst().test_source(100.0, &patch(|_, _| 1.0)));
}

#[test]
fn test_negative_source_passes() {
    assert!(analyst().test_source(-100.0, &patch(|_, _| -1.0)));
}

#[test]
fn test_too_many_masked_pixels() {
    let mut sub = patch(|_, _| 1.0);
    for col in 0..10 {
        sub.mask[[0, col]] = BAD;
        sub.mask[[1, col]] = BAD;
    }
    assert!(!analyst().test_source(80.0, &sub));

    // 5% is within the default 10% tolerance.
    let mut sub = patch(|_, _| 1.0);
    for col in 0..5 {
        sub.mask[[0, col]] = BAD;
    }
    assert!(analyst().test_source(95.0, &sub));
}

#[test]
fn test_dipole_fails_flux_polarity() {
    let sub = patch(|_, c| if c < 5 { 1.0 } else { -1.0 });
    assert!(!analyst().test_source(1.0, &sub));
}

#[test]
fn test_polarity_count() {
    // 25 faint negatives: flux ratio ~0.97, count ratio 0.75.
    let sub = patch(|r, c| if r * 10 + c < 25 { -0.1 } else { 1.0 });
    assert!(analyst().test_source(72.5, &sub));

    // 35 negatives: count ratio 0.65 < 0.7.
    let sub = patch(|r, c| if r * 10 + c < 35 { -0.1 } else { 1.0 });
    assert!(!analyst().test_source(61.5, &sub));
}

#[test]
fn test_degenerate_ratios_reject() {
    assert!(!analyst().test_source(0.0, &patch(|_, _| 0.0)));
    assert!(!analyst().test_source(1.0, &patch(|_, _| 0.0)));

    let empty = MaskedImage::from_image(Array2::<f64>::zeros((0, 0)), 1.0);
    assert!(!analyst().test_source(1.0, &empty));
}

#[test]
fn test_custom_planes_change_bit_mask() {
    let config = DiaSourceConfig {
        bad_mask_planes: vec!["CR".into()],
        ..DiaSourceConfig::default()
    };
    let analyst = DiaSourceAnalyst::new(config);
    assert_eq!(analyst.bit_mask(), diffim_core::mask::CR);

    // BAD no longer counts as masked.
    let mut sub = patch(|_, _| 1.0);
    for col in 0..10 {
        sub.mask[[0, col]] = BAD;
        sub.mask[[1, col]] = BAD;
    }
    assert!(analyst.test_source(100.0, &sub));
}

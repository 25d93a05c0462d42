use ndarray::Array2;

use diffim_core::detection::{detect_footprints, Threshold, ThresholdType};
use diffim_core::masked_image::{BBox, MaskedImage};

/// 12x12 image with a 3x3 block of 5.0 at rows/cols 2..5, a single 4.0 pixel
/// at (9, 9) and a 2x2 block of -6.0 at rows 8..10, cols 2..4.
fn scene() -> MaskedImage<f64> {
    let mut image = Array2::<f64>::zeros((12, 12));
    for row in 2..5 {
        for col in 2..5 {
            image[[row, col]] = 5.0;
        }
    }
    image[[3, 3]] = 7.0;
    image[[9, 9]] = 4.0;
    for row in 8..10 {
        for col in 2..4 {
            image[[row, col]] = -6.0;
        }
    }
    MaskedImage::from_image(image, 4.0)
}

#[test]
fn test_value_threshold() {
    let image = scene();
    let found = detect_footprints(&image, &Threshold::new(3.0, ThresholdType::Value), 1);
    assert_eq!(found.len(), 2);

    let block = &found[0];
    assert_eq!(block.npix(), 9);
    assert_eq!(block.bbox(), BBox::new(2, 2, 3, 3));
    assert_eq!((block.peak().x, block.peak().y, block.peak().value), (3, 3, 7.0));

    assert_eq!(found[1].npix(), 1);
    assert_eq!(found[1].bbox(), BBox::new(9, 9, 1, 1));
}

#[test]
fn test_npix_min_drops_small_regions() {
    let image = scene();
    let found = detect_footprints(&image, &Threshold::new(3.0, ThresholdType::Value), 2);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].npix(), 9);
}

#[test]
fn test_negative_polarity() {
    let image = scene();
    let threshold = Threshold::new(3.0, ThresholdType::Value).negative();
    let found = detect_footprints(&image, &threshold, 1);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].npix(), 4);
    assert_eq!(found[0].bbox(), BBox::new(2, 8, 2, 2));
    assert_eq!(found[0].peak().value, -6.0);
}

#[test]
fn test_variance_threshold_uses_pixel_noise() {
    let mut image = scene();
    // sigma = 2 everywhere, except 3 on the lone pixel.
    image.variance[[9, 9]] = 9.0;
    let found = detect_footprints(&image, &Threshold::new(1.5, ThresholdType::Variance), 1);
    // 4.0 > 1.5 * 3 is false; 5.0 > 1.5 * 2 is true.
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].npix(), 9);
}

#[test]
fn test_stdev_threshold_scales_with_image_spread() {
    let mut data = Array2::<f64>::zeros((10, 10));
    data[[5, 5]] = 100.0;
    let image = MaskedImage::from_image(data, 1.0);
    // stddev is 100 * sqrt(0.01 * 0.99) ~ 9.95.
    assert_eq!(
        detect_footprints(&image, &Threshold::new(5.0, ThresholdType::Stdev), 1).len(),
        1
    );
    assert!(detect_footprints(&image, &Threshold::new(11.0, ThresholdType::Stdev), 1).is_empty());
}

#[test]
fn test_origin_offset_applied() {
    let image = scene().with_origin(100, -50);
    let found = detect_footprints(&image, &Threshold::new(3.0, ThresholdType::Value), 2);
    assert_eq!(found[0].bbox(), BBox::new(102, -48, 3, 3));
    assert_eq!((found[0].peak().x, found[0].peak().y), (103, -47));
    assert!(found[0].contains(104, -46));
    assert!(!found[0].contains(105, -46));
}

#[test]
fn test_diagonal_pixels_connect() {
    let mut data = Array2::<f64>::zeros((5, 5));
    data[[1, 1]] = 1.0;
    data[[2, 2]] = 1.0;
    data[[3, 1]] = 1.0;
    let image = MaskedImage::from_image(data, 1.0);
    let found = detect_footprints(&image, &Threshold::new(0.5, ThresholdType::Value), 1);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].npix(), 3);
}

#[test]
fn test_nan_pixels_never_detected() {
    let mut data = Array2::<f64>::zeros((4, 4));
    data[[1, 1]] = f64::NAN;
    let image = MaskedImage::from_image(data, 1.0);
    assert!(detect_footprints(&image, &Threshold::new(-1.0, ThresholdType::Value), 1)
        .iter()
        .all(|fp| !fp.contains(1, 1)));
}

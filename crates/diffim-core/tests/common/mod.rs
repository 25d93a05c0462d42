#![allow(dead_code)]

use ndarray::Array2;

use diffim_core::masked_image::MaskedImage;

/// Deterministic pseudo-random values in `[0, amplitude)`, shape `(h, w)`.
pub fn noise(h: usize, w: usize, seed: u64, amplitude: f64) -> Array2<f64> {
    let mut state = seed;
    Array2::from_shape_fn((h, w), |_| {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        ((state >> 33) as f64 / (1u64 << 31) as f64) * amplitude
    })
}

/// Add a circular Gaussian of the given peak value centered on pixel `(x, y)`.
pub fn add_gaussian(image: &mut Array2<f64>, x: usize, y: usize, peak: f64, sigma: f64) {
    let two_s2 = 2.0 * sigma * sigma;
    for ((row, col), v) in image.indexed_iter_mut() {
        let dx = col as f64 - x as f64;
        let dy = row as f64 - y as f64;
        *v += peak * (-(dx * dx + dy * dy) / two_s2).exp();
    }
}

/// Zero image with unit-peak Gaussian stars at `stars` (`(x, y)` pairs).
pub fn star_field(h: usize, w: usize, stars: &[(usize, usize)], sigma: f64) -> Array2<f64> {
    let mut image = Array2::<f64>::zeros((h, w));
    for &(x, y) in stars {
        add_gaussian(&mut image, x, y, 1.0, sigma);
    }
    image
}

/// Stars on a square grid with `spacing` pixels between them, starting at `margin`.
pub fn grid_positions(h: usize, w: usize, margin: usize, spacing: usize) -> Vec<(usize, usize)> {
    let mut positions = Vec::new();
    let mut y = margin;
    while y + margin <= h {
        let mut x = margin;
        while x + margin <= w {
            positions.push((x, y));
            x += spacing;
        }
        y += spacing;
    }
    positions
}

/// Wrap an image with an empty mask and uniform variance.
pub fn masked(image: Array2<f64>, variance: f64) -> MaskedImage<f64> {
    MaskedImage::from_image(image, variance)
}

/// Largest absolute difference over `rows x cols`.
pub fn max_abs_diff(
    a: &Array2<f64>,
    b: &Array2<f64>,
    rows: std::ops::Range<usize>,
    cols: std::ops::Range<usize>,
) -> f64 {
    let mut worst = 0.0f64;
    for row in rows {
        for col in cols.clone() {
            worst = worst.max((a[[row, col]] - b[[row, col]]).abs());
        }
    }
    worst
}

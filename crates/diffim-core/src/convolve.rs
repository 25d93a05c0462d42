use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::Arc;

use ndarray::Array2;
use num_complex::Complex;
use num_traits::Float;
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::consts::{FFT_KERNEL_AREA_THRESHOLD, PARALLEL_PIXEL_THRESHOLD};
use crate::kernel::Kernel;
use crate::mask::{self, MaskPixel};
use crate::masked_image::MaskedImage;

/// How convolution is carried out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvolutionMethod {
    /// Direct summation for small kernels, FFT for large ones.
    #[default]
    Auto,
    Direct,
    Fft,
}

impl std::fmt::Display for ConvolutionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "Auto"),
            Self::Direct => write!(f, "Direct"),
            Self::Fft => write!(f, "FFT"),
        }
    }
}

impl ConvolutionMethod {
    fn use_fft(self, kernel: &Kernel) -> bool {
        match self {
            Self::Auto => kernel.width() * kernel.height() >= FFT_KERNEL_AREA_THRESHOLD,
            Self::Direct => false,
            Self::Fft => true,
        }
    }
}

/// Pixels of a `width x height` image on which a convolution with `kernel`
/// is fully defined, as `(rows, cols)`.
///
/// For a kernel of width `kw` anchored at `cx` the good columns run from `cx`
/// to `width - (kw - cx) + 1` exclusive; rows likewise. Both ranges are
/// empty when the image is smaller than the kernel.
pub fn valid_window(width: usize, height: usize, kernel: &Kernel) -> (Range<usize>, Range<usize>) {
    let span = |len: usize, k: usize, ctr: usize| {
        let end = len as isize - (k - ctr) as isize + 1;
        if end <= ctr as isize {
            0..0
        } else {
            ctr..end as usize
        }
    };
    (
        span(height, kernel.height(), kernel.ctr_y),
        span(width, kernel.width(), kernel.ctr_x),
    )
}

/// Convolve `image` with `kernel`.
///
/// Uses the anchored correlation convention
/// `out[r, c] = sum k[kr, kc] * in[r + kr - ctr_y, c + kc - ctr_x]`, so a delta
/// kernel with its unit pixel at the anchor is the identity. Pixels outside
/// [`valid_window`] are set to zero.
pub fn convolve<T>(image: &Array2<T>, kernel: &Kernel, method: ConvolutionMethod) -> Array2<T>
where
    T: Float + Send + Sync,
{
    if method.use_fft(kernel) {
        convolve_fft(image, kernel)
    } else {
        convolve_direct(image, kernel)
    }
}

/// Convolve all three planes of a masked image.
///
/// The variance plane is convolved with the squared kernel, mask bits are
/// ORed over the kernel's nonzero support, and the border band is flagged
/// `EDGE`.
pub fn convolve_masked<T>(
    image: &MaskedImage<T>,
    kernel: &Kernel,
    method: ConvolutionMethod,
) -> MaskedImage<T>
where
    T: Float + Send + Sync,
{
    let squared = Kernel {
        data: kernel.data.mapv(|v| v * v),
        ctr_x: kernel.ctr_x,
        ctr_y: kernel.ctr_y,
    };
    let convolved_image = convolve(&image.image, kernel, method);
    let convolved_variance = convolve(&image.variance, &squared, method);
    let convolved_mask = convolve_mask(&image.mask, kernel);

    MaskedImage {
        image: convolved_image,
        mask: convolved_mask,
        variance: convolved_variance,
        x0: image.x0,
        y0: image.y0,
    }
}

fn convolve_mask(mask: &Array2<MaskPixel>, kernel: &Kernel) -> Array2<MaskPixel> {
    let (h, w) = mask.dim();
    let (rows, cols) = valid_window(w, h, kernel);
    let support: Vec<(usize, usize)> = kernel
        .data
        .indexed_iter()
        .filter(|(_, &v)| v != 0.0)
        .map(|(idx, _)| idx)
        .collect();

    let mut out = Array2::<MaskPixel>::from_elem((h, w), mask::EDGE);
    for row in rows {
        for col in cols.clone() {
            let mut bits = 0;
            for &(kr, kc) in &support {
                bits |= mask[[row + kr - kernel.ctr_y, col + kc - kernel.ctr_x]];
            }
            out[[row, col]] = bits;
        }
    }
    out
}

fn convolve_row<T: Float>(
    image: &Array2<T>,
    kernel: &Kernel,
    row: usize,
    cols: &Range<usize>,
    width: usize,
) -> Vec<T> {
    let mut out = vec![T::zero(); width];
    for col in cols.clone() {
        out[col] = convolve_pixel(image, kernel, row, col);
    }
    out
}

/// One output pixel of the direct sum. `(row, col)` must lie in the valid window.
fn convolve_pixel<T: Float>(image: &Array2<T>, kernel: &Kernel, row: usize, col: usize) -> T {
    let mut sum = 0.0f64;
    for ((kr, kc), &kv) in kernel.data.indexed_iter() {
        if kv == 0.0 {
            continue;
        }
        let src = image[[row + kr - kernel.ctr_y, col + kc - kernel.ctr_x]];
        sum += kv * src.to_f64().unwrap_or(f64::NAN);
    }
    T::from(sum).unwrap_or_else(T::nan)
}

fn convolve_direct<T>(image: &Array2<T>, kernel: &Kernel) -> Array2<T>
where
    T: Float + Send + Sync,
{
    let (h, w) = image.dim();
    let (rows, cols) = valid_window(w, h, kernel);
    let mut result = Array2::<T>::zeros((h, w));
    if rows.is_empty() || cols.is_empty() {
        return result;
    }

    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        let computed: Vec<Vec<T>> = rows
            .clone()
            .into_par_iter()
            .map(|row| convolve_row(image, kernel, row, &cols, w))
            .collect();
        for (row, row_data) in rows.zip(computed) {
            for col in cols.clone() {
                result[[row, col]] = row_data[col];
            }
        }
    } else {
        for row in rows {
            let row_data = convolve_row(image, kernel, row, &cols, w);
            for col in cols.clone() {
                result[[row, col]] = row_data[col];
            }
        }
    }
    result
}

/// Convolution through zero-padded FFTs. Agrees with the direct path on the
/// valid window.
///
/// Non-finite inputs are zeroed before the transform, which would otherwise
/// smear them over every frequency; output pixels whose kernel support
/// covers one are recomputed directly afterwards.
fn convolve_fft<T>(image: &Array2<T>, kernel: &Kernel) -> Array2<T>
where
    T: Float + Send + Sync,
{
    let (h, w) = image.dim();
    let (rows, cols) = valid_window(w, h, kernel);
    let mut result = Array2::<T>::zeros((h, w));
    if rows.is_empty() || cols.is_empty() {
        return result;
    }

    let ph = h + kernel.height();
    let pw = w + kernel.width();

    let mut padded = Array2::<Complex<f64>>::zeros((ph, pw));
    let mut non_finite = Vec::new();
    for ((row, col), &v) in image.indexed_iter() {
        match v.to_f64() {
            Some(v) if v.is_finite() => padded[[row, col]] = Complex::new(v, 0.0),
            _ => non_finite.push((row, col)),
        }
    }

    // Kernel offset (kr - cy, kc - cx) goes to the wrapped position of its
    // negation so the circular product becomes a correlation.
    let mut wrapped = Array2::<Complex<f64>>::zeros((ph, pw));
    for ((kr, kc), &kv) in kernel.data.indexed_iter() {
        let dr = (ph + kernel.ctr_y - kr) % ph;
        let dc = (pw + kernel.ctr_x - kc) % pw;
        wrapped[[dr, dc]] = Complex::new(kv, 0.0);
    }

    let mut planner = FftPlanner::new();
    fft2d(&mut padded, &mut planner, false);
    fft2d(&mut wrapped, &mut planner, false);
    padded.zip_mut_with(&wrapped, |a, &b| *a *= b);
    fft2d(&mut padded, &mut planner, true);

    let scale = 1.0 / (ph * pw) as f64;
    for row in rows.clone() {
        for col in cols.clone() {
            result[[row, col]] = T::from(padded[[row, col]].re * scale).unwrap_or_else(T::nan);
        }
    }

    for (row, col) in tainted_outputs(&non_finite, kernel, &rows, &cols) {
        result[[row, col]] = convolve_pixel(image, kernel, row, col);
    }
    result
}

/// Valid-window output pixels whose nonzero kernel support reads one of `inputs`.
fn tainted_outputs(
    inputs: &[(usize, usize)],
    kernel: &Kernel,
    rows: &Range<usize>,
    cols: &Range<usize>,
) -> BTreeSet<(usize, usize)> {
    let mut out = BTreeSet::new();
    if inputs.is_empty() {
        return out;
    }
    let support: Vec<(usize, usize)> = kernel
        .data
        .indexed_iter()
        .filter(|(_, &v)| v != 0.0)
        .map(|(idx, _)| idx)
        .collect();
    for &(ir, ic) in inputs {
        for &(kr, kc) in &support {
            // ir = row + kr - ctr_y
            let (Some(row), Some(col)) = (
                (ir + kernel.ctr_y).checked_sub(kr),
                (ic + kernel.ctr_x).checked_sub(kc),
            ) else {
                continue;
            };
            if rows.contains(&row) && cols.contains(&col) {
                out.insert((row, col));
            }
        }
    }
    out
}

/// In-place unnormalized 2D FFT: rows, then columns.
fn fft2d(data: &mut Array2<Complex<f64>>, planner: &mut FftPlanner<f64>, inverse: bool) {
    let (h, w) = data.dim();
    let (fft_row, fft_col) = if inverse {
        (planner.plan_fft_inverse(w), planner.plan_fft_inverse(h))
    } else {
        (planner.plan_fft_forward(w), planner.plan_fft_forward(h))
    };

    let rows = transform_lines(data, &fft_row, h, |d, i, j| d[[i, j]], w);
    for (row, row_data) in rows.into_iter().enumerate() {
        for (col, val) in row_data.into_iter().enumerate() {
            data[[row, col]] = val;
        }
    }

    let cols = transform_lines(data, &fft_col, w, |d, i, j| d[[j, i]], h);
    for (col, col_data) in cols.into_iter().enumerate() {
        for (row, val) in col_data.into_iter().enumerate() {
            data[[row, col]] = val;
        }
    }
}

fn transform_lines<F>(
    data: &Array2<Complex<f64>>,
    fft: &Arc<dyn Fft<f64>>,
    lines: usize,
    get: F,
    len: usize,
) -> Vec<Vec<Complex<f64>>>
where
    F: Fn(&Array2<Complex<f64>>, usize, usize) -> Complex<f64> + Sync,
{
    let run = |i: usize| {
        let mut line: Vec<Complex<f64>> = (0..len).map(|j| get(data, i, j)).collect();
        fft.process(&mut line);
        line
    };
    if lines * len >= PARALLEL_PIXEL_THRESHOLD {
        (0..lines).into_par_iter().map(run).collect()
    } else {
        (0..lines).map(run).collect()
    }
}

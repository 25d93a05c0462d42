use std::ops::Range;

use nalgebra::{DMatrix, DVector};
use ndarray::Array2;
use num_traits::Float;
use rayon::prelude::*;

use crate::consts::{NORMAL_EQUATION_ROW_BAND, PARALLEL_PIXEL_THRESHOLD};

/// The weighted normal equations `M x = B` of a kernel fit.
///
/// Indices `0..n` are basis kernels, index `n` is the differential
/// background.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalEquations {
    pub m: DMatrix<f64>,
    pub b: DVector<f64>,
}

impl NormalEquations {
    /// All-zero system for `n_kernel` basis kernels plus one background term.
    pub fn zeros(n_kernel: usize) -> Self {
        let n = n_kernel + 1;
        Self {
            m: DMatrix::zeros(n, n),
            b: DVector::zeros(n),
        }
    }

    pub fn n_parameters(&self) -> usize {
        self.b.len()
    }

    fn merge(mut self, other: &NormalEquations) -> Self {
        self.m += &other.m;
        self.b += &other.b;
        self
    }

    /// Copy the upper triangle onto the lower one, making `m` exactly symmetric.
    fn mirror_upper(&mut self) {
        let n = self.n_parameters();
        for i in 0..n {
            for j in (i + 1)..n {
                self.m[(j, i)] = self.m[(i, j)];
            }
        }
    }
}

/// Accumulate the normal equations over the `rows x cols` window.
///
/// `convolved[k]` is the template convolved with basis kernel `k`;
/// every pixel is weighted by `1 / variance`. Only the upper triangle of `m`
/// is accumulated and then mirrored, so the result is bit-for-bit symmetric.
/// Large windows are split into row bands whose partial sums are merged in
/// band order.
pub fn build_normal_equations<T>(
    convolved: &[Array2<T>],
    not_convolved: &Array2<T>,
    variance: &Array2<T>,
    rows: Range<usize>,
    cols: Range<usize>,
) -> NormalEquations
where
    T: Float + Send + Sync,
{
    let n_kernel = convolved.len();
    let n_pixels = rows.len() * cols.len();

    let mut equations = if n_pixels >= PARALLEL_PIXEL_THRESHOLD {
        let bands: Vec<Range<usize>> = rows
            .clone()
            .step_by(NORMAL_EQUATION_ROW_BAND)
            .map(|start| start..(start + NORMAL_EQUATION_ROW_BAND).min(rows.end))
            .collect();
        let partials: Vec<NormalEquations> = bands
            .into_par_iter()
            .map(|band| accumulate(convolved, not_convolved, variance, band, &cols))
            .collect();
        partials
            .iter()
            .fold(NormalEquations::zeros(n_kernel), |acc, p| acc.merge(p))
    } else {
        accumulate(convolved, not_convolved, variance, rows, &cols)
    };

    equations.mirror_upper();
    equations
}

fn accumulate<T: Float>(
    convolved: &[Array2<T>],
    not_convolved: &Array2<T>,
    variance: &Array2<T>,
    rows: Range<usize>,
    cols: &Range<usize>,
) -> NormalEquations {
    let n = convolved.len();
    let mut eq = NormalEquations::zeros(n);
    let mut c = vec![0.0f64; n];

    for row in rows {
        for col in cols.clone() {
            let nc = to_f64(not_convolved[[row, col]]);
            let iv = 1.0 / to_f64(variance[[row, col]]);
            for (ck, image) in c.iter_mut().zip(convolved) {
                *ck = to_f64(image[[row, col]]);
            }

            for i in 0..n {
                let ci = c[i];
                for j in i..n {
                    eq.m[(i, j)] += ci * c[j] * iv;
                }
                eq.b[i] += nc * ci * iv;
                // Cross term with the background parameter.
                eq.m[(i, n)] += ci * iv;
            }

            eq.b[n] += nc * iv;
            eq.m[(n, n)] += iv;
        }
    }
    eq
}

fn to_f64<T: Float>(v: T) -> f64 {
    v.to_f64().unwrap_or(f64::NAN)
}

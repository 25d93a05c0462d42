//! Least-squares fit of a PSF-matching kernel and differential background.
//!
//! The template is convolved with every basis kernel; the weighted normal
//! equations of "science = sum_k w_k (basis_k * template) + background" are
//! accumulated over the pixels where every convolution is valid, then solved
//! with [`solver::solve_normal_equations`].

pub mod normal_equations;
pub mod solver;

use std::time::Instant;

use ndarray::Array2;
use num_traits::Float;
use rayon::prelude::*;
use tracing::debug;

use crate::convolve::{convolve, valid_window, ConvolutionMethod};
use crate::error::{DiffimError, Result};
use crate::kernel::{BasisKernelList, LinearCombinationKernel};
use crate::masked_image::check_same_dim;

pub use normal_equations::{build_normal_equations, NormalEquations};
pub use solver::{error_covariance, solve_normal_equations, SolverStage};

/// Result of one kernel fit.
#[derive(Clone, Debug)]
pub struct KernelSolution {
    /// Best-fit kernel, weighted by the solution coefficients.
    pub kernel: LinearCombinationKernel,
    /// Per-coefficient uncertainty, weighted by sqrt of the covariance diagonal.
    pub kernel_error: LinearCombinationKernel,
    pub background: f64,
    pub background_error: f64,
    /// Decomposition that produced the solution.
    pub solver_stage: SolverStage,
}

/// Reusable kernel fitter bound to one basis set.
///
/// Holds no fit state: every [`apply`](Self::apply) builds its own normal
/// equations, so consecutive fits cannot contaminate each other.
#[derive(Clone, Debug)]
pub struct PsfMatchingFunctor {
    basis: BasisKernelList,
    method: ConvolutionMethod,
}

impl PsfMatchingFunctor {
    pub fn new(basis: BasisKernelList) -> Self {
        Self {
            basis,
            method: ConvolutionMethod::default(),
        }
    }

    pub fn with_convolution(mut self, method: ConvolutionMethod) -> Self {
        self.method = method;
        self
    }

    pub fn basis(&self) -> &BasisKernelList {
        &self.basis
    }

    pub fn apply<T>(
        &self,
        to_convolve: &Array2<T>,
        to_not_convolve: &Array2<T>,
        variance: &Array2<T>,
        kernel_cols: usize,
        kernel_rows: usize,
    ) -> Result<KernelSolution>
    where
        T: Float + Send + Sync,
    {
        fit_psf_matching_kernel(
            to_convolve,
            to_not_convolve,
            variance,
            &self.basis,
            kernel_cols,
            kernel_rows,
            self.method,
        )
    }
}

/// Fit the kernel that maps `to_convolve` onto `to_not_convolve`.
///
/// `variance` is the per-pixel variance estimate used for inverse-variance
/// weighting; it must be strictly positive over the valid window. All
/// three images must share dimensions and every basis kernel must be
/// `kernel_cols x kernel_rows`.
pub fn fit_psf_matching_kernel<T>(
    to_convolve: &Array2<T>,
    to_not_convolve: &Array2<T>,
    variance: &Array2<T>,
    basis: &BasisKernelList,
    kernel_cols: usize,
    kernel_rows: usize,
    method: ConvolutionMethod,
) -> Result<KernelSolution>
where
    T: Float + Send + Sync,
{
    check_same_dim(to_convolve.dim(), to_not_convolve.dim())?;
    check_same_dim(to_convolve.dim(), variance.dim())?;
    check_basis(basis, kernel_cols, kernel_rows)?;

    let (height, width) = to_convolve.dim();
    let (rows, cols) = valid_window(width, height, &basis[0]);
    if rows.is_empty() || cols.is_empty() {
        return Err(DiffimError::InvalidParameter(format!(
            "{width}x{height} image has no pixels unaffected by a {kernel_cols}x{kernel_rows} kernel"
        )));
    }

    let timer = Instant::now();
    let convolved: Vec<Array2<T>> = basis
        .par_iter()
        .map(|k| convolve(to_convolve, k, method))
        .collect();
    debug!(
        count = basis.len(),
        elapsed_ms = timer.elapsed().as_millis() as u64,
        "Basis convolutions complete"
    );

    let timer = Instant::now();
    let equations = build_normal_equations(
        &convolved,
        to_not_convolve,
        variance,
        rows.clone(),
        cols.clone(),
    );
    debug!(
        rows = ?rows,
        cols = ?cols,
        elapsed_ms = timer.elapsed().as_millis() as u64,
        "Normal equations accumulated"
    );

    let timer = Instant::now();
    let (solution, stage) = solve_normal_equations(&equations.m, &equations.b)?;
    let covariance = error_covariance(&equations.m)?;
    debug!(
        stage = %stage,
        elapsed_ms = timer.elapsed().as_millis() as u64,
        "Kernel solution found"
    );

    let n = basis.len();
    let mut values = Vec::with_capacity(n);
    let mut errors = Vec::with_capacity(n);
    for idx in 0..=n {
        let what = if idx == n {
            "background".to_string()
        } else {
            format!("kernel coefficient {idx}")
        };
        let coefficient = solution[idx];
        let var = covariance[(idx, idx)];
        if coefficient.is_nan() {
            return Err(DiffimError::NumericalFailure(format!(
                "unable to determine {what} (nan)"
            )));
        }
        if var.is_nan() {
            return Err(DiffimError::NumericalFailure(format!(
                "unable to determine {what} uncertainty (nan)"
            )));
        }
        if var < 0.0 {
            return Err(DiffimError::NumericalFailure(format!(
                "unable to determine {what} uncertainty, negative variance ({var:.3e})"
            )));
        }
        values.push(coefficient);
        errors.push(var.sqrt());
    }

    let background = values[n];
    let background_error = errors[n];
    values.truncate(n);
    errors.truncate(n);

    Ok(KernelSolution {
        kernel: LinearCombinationKernel::new(basis.clone(), values)?,
        kernel_error: LinearCombinationKernel::new(basis.clone(), errors)?,
        background,
        background_error,
        solver_stage: stage,
    })
}

fn check_basis(basis: &BasisKernelList, kernel_cols: usize, kernel_rows: usize) -> Result<()> {
    let Some(first) = basis.first() else {
        return Err(DiffimError::InvalidParameter(
            "basis kernel list is empty".into(),
        ));
    };
    let mismatched = basis.iter().any(|k| {
        k.width() != kernel_cols || k.height() != kernel_rows || !k.same_geometry(first)
    });
    if mismatched {
        return Err(DiffimError::InvalidParameter(format!(
            "basis kernels must all be {kernel_cols}x{kernel_rows} with a common center"
        )));
    }
    Ok(())
}

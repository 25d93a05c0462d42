use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DiffimError, Result};

use super::{BasisKernelList, Kernel};

/// Family of basis kernels used to build the PSF-matching kernel.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum BasisKind {
    /// One unit pixel per kernel position.
    #[default]
    DeltaFunction,
    /// Gaussians of the given widths modulated by polynomials of the given degrees.
    AlardLupton {
        sig_gauss: Vec<f64>,
        deg_gauss: Vec<u32>,
    },
}

impl std::fmt::Display for BasisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeltaFunction => write!(f, "Delta function"),
            Self::AlardLupton { .. } => write!(f, "Alard-Lupton"),
        }
    }
}

/// Build the basis set selected by `kind` for a `cols x rows` kernel.
pub fn generate_basis(kind: &BasisKind, cols: usize, rows: usize) -> Result<BasisKernelList> {
    match kind {
        BasisKind::DeltaFunction => generate_delta_function_basis(cols, rows),
        BasisKind::AlardLupton {
            sig_gauss,
            deg_gauss,
        } => generate_alard_lupton_basis(cols, rows, sig_gauss, deg_gauss),
    }
}

/// Delta-function basis: `cols * rows` kernels, each `cols x rows` with a
/// single unit pixel.
///
/// Kernels are ordered row-major: index `row * cols + col` holds the unit
/// pixel at `(col, row)`.
pub fn generate_delta_function_basis(cols: usize, rows: usize) -> Result<BasisKernelList> {
    check_grid(cols, rows)?;
    let mut kernels = Vec::with_capacity(cols * rows);
    for row in 0..rows {
        for col in 0..cols {
            kernels.push(Kernel::delta_function(cols, rows, col, row));
        }
    }
    debug!(cols, rows, count = kernels.len(), "Generated delta-function basis");
    Ok(kernels.into())
}

/// Alard-Lupton basis. Validates the grid, then always fails: this basis
/// family is not implemented.
pub fn generate_alard_lupton_basis(
    cols: usize,
    rows: usize,
    sig_gauss: &[f64],
    deg_gauss: &[u32],
) -> Result<BasisKernelList> {
    check_grid(cols, rows)?;
    Err(DiffimError::Unimplemented(format!(
        "Alard-Lupton basis ({} gaussians, degrees {:?})",
        sig_gauss.len(),
        deg_gauss
    )))
}

fn check_grid(cols: usize, rows: usize) -> Result<()> {
    if cols < 1 || rows < 1 {
        return Err(DiffimError::InvalidParameter(format!(
            "kernel rows and cols must be positive (got {cols}x{rows})"
        )));
    }
    Ok(())
}

use nalgebra::{Cholesky, DMatrix, DVector, Dyn, SymmetricEigen};
use tracing::debug;

use crate::consts::{EIGEN_ZERO_TOLERANCE, MAX_EIGEN_ITERATIONS, PIVOT_TOLERANCE};
use crate::error::{DiffimError, Result};

/// Decomposition that produced a kernel solution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolverStage {
    /// Symmetric positive definite `L D L^T`.
    Ldlt,
    /// Cholesky `L L^T`.
    Llt,
    /// LU with partial pivoting.
    Lu,
    /// Eigen-decomposition pseudo-inverse.
    EigenPseudoInverse,
}

impl std::fmt::Display for SolverStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ldlt => write!(f, "Cholesky LDL^T"),
            Self::Llt => write!(f, "Cholesky LL^T"),
            Self::Lu => write!(f, "LU"),
            Self::EigenPseudoInverse => write!(f, "eigen-values"),
        }
    }
}

/// Solve `m x = b`, escalating LDL^T -> LL^T -> LU -> eigen pseudo-inverse.
///
/// A stage fails when its factorization does not exist, is numerically
/// singular, or yields non-finite values. Only a failing eigen-decomposition
/// is fatal.
pub fn solve_normal_equations(
    m: &DMatrix<f64>,
    b: &DVector<f64>,
) -> Result<(DVector<f64>, SolverStage)> {
    if let Some(x) = solve_ldlt(m, b).filter(all_finite) {
        return Ok((x, SolverStage::Ldlt));
    }
    debug!("Unable to determine kernel via Cholesky LDL^T");

    if let Some(x) = solve_llt(m, b).filter(all_finite) {
        return Ok((x, SolverStage::Llt));
    }
    debug!("Unable to determine kernel via Cholesky LL^T");

    if let Some(x) = solve_lu(m, b).filter(all_finite) {
        return Ok((x, SolverStage::Lu));
    }
    debug!("Unable to determine kernel via LU");

    match solve_eigen(m, b).filter(all_finite) {
        Some(x) => Ok((x, SolverStage::EigenPseudoInverse)),
        None => {
            debug!("Unable to determine kernel via eigen-values");
            Err(DiffimError::NumericalFailure(
                "unable to determine kernel solution: every decomposition failed".into(),
            ))
        }
    }
}

/// Parameter covariance of the fit.
///
/// Factors `Cov = M^T M = L L^T` and returns `(L^T)^-1 L^-1`. This is
/// `(M^T M)^-1`, not the textbook `M^-1`; the scale is kept as historically
/// produced since downstream uncertainties are calibrated against it.
pub fn error_covariance(m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let cov = m.transpose() * m;
    let chol = checked_cholesky(&cov).ok_or_else(|| {
        DiffimError::NumericalFailure(
            "unable to determine kernel uncertainty: covariance is not positive definite".into(),
        )
    })?;
    let l = chol.l();
    let n = l.nrows();
    let l_inv = l
        .solve_lower_triangular(&DMatrix::identity(n, n))
        .ok_or_else(|| {
            DiffimError::NumericalFailure(
                "unable to determine kernel uncertainty: singular Cholesky factor".into(),
            )
        })?;
    Ok(l_inv.transpose() * l_inv)
}

fn all_finite(x: &DVector<f64>) -> bool {
    x.iter().all(|v| v.is_finite())
}

/// `L D L^T` without pivoting; fails on any pivot that is not clearly positive.
fn solve_ldlt(m: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let n = m.nrows();
    let mut l = DMatrix::<f64>::identity(n, n);
    let mut d = DVector::<f64>::zeros(n);

    for j in 0..n {
        let mut dj = m[(j, j)];
        for k in 0..j {
            dj -= l[(j, k)] * l[(j, k)] * d[k];
        }
        if !pivot_ok(dj, m[(j, j)]) {
            return None;
        }
        d[j] = dj;
        for i in (j + 1)..n {
            let mut v = m[(i, j)];
            for k in 0..j {
                v -= l[(i, k)] * l[(j, k)] * d[k];
            }
            l[(i, j)] = v / dj;
        }
    }

    // L y = b, then D z = y, then L^T x = z.
    let mut x = b.clone();
    for i in 0..n {
        for k in 0..i {
            x[i] -= l[(i, k)] * x[k];
        }
    }
    for i in 0..n {
        x[i] /= d[i];
    }
    for i in (0..n).rev() {
        for k in (i + 1)..n {
            x[i] -= l[(k, i)] * x[k];
        }
    }
    Some(x)
}

fn solve_llt(m: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    checked_cholesky(m).map(|chol| chol.solve(b))
}

fn solve_lu(m: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let lu = m.clone().lu();
    let u = lu.u();
    let max_pivot = u.diagonal().iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    if u.diagonal().iter().any(|v| !pivot_ok(v.abs(), max_pivot)) {
        return None;
    }
    lu.solve(b)
}

/// `x = V diag(1/lambda) V^T b` with zero eigenvalues left at zero.
fn solve_eigen(m: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let eigen = SymmetricEigen::try_new(m.clone(), f64::EPSILON, MAX_EIGEN_ITERATIONS)?;
    let n = eigen.eigenvalues.len();
    let max_abs = eigen
        .eigenvalues
        .iter()
        .fold(0.0f64, |acc, v| acc.max(v.abs()));
    let cutoff = EIGEN_ZERO_TOLERANCE * max_abs * n as f64;

    let inverted = eigen
        .eigenvalues
        .map(|lambda| if lambda.abs() <= cutoff { 0.0 } else { 1.0 / lambda });
    let v = &eigen.eigenvectors;
    Some(v * DMatrix::from_diagonal(&inverted) * v.transpose() * b)
}

/// Cholesky factorization that also rejects numerically singular pivots.
fn checked_cholesky(a: &DMatrix<f64>) -> Option<Cholesky<f64, Dyn>> {
    let chol = Cholesky::new(a.clone())?;
    let l = chol.l_dirty();
    let singular = (0..a.nrows()).any(|j| !pivot_ok(l[(j, j)] * l[(j, j)], a[(j, j)]));
    if singular {
        None
    } else {
        Some(chol)
    }
}

/// A pivot is usable when finite and positive relative to its scale.
fn pivot_ok(pivot: f64, scale: f64) -> bool {
    pivot.is_finite() && pivot > PIVOT_TOLERANCE * scale.abs()
}

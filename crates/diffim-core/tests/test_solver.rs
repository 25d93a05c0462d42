use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector};

use diffim_core::psf_match::{error_covariance, solve_normal_equations, SolverStage};

#[test]
fn test_positive_definite_uses_ldlt() {
    let m = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.5, 1.0, 3.0, 0.2, 0.5, 0.2, 2.0]);
    let x_true = DVector::from_vec(vec![1.0, -2.0, 0.5]);
    let b = &m * &x_true;

    let (x, stage) = solve_normal_equations(&m, &b).unwrap();
    assert_eq!(stage, SolverStage::Ldlt);
    for i in 0..3 {
        assert_relative_eq!(x[i], x_true[i], epsilon = 1e-12);
    }
}

#[test]
fn test_indefinite_falls_back_to_lu() {
    let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
    let b = DVector::from_vec(vec![3.0, 3.0]);

    let (x, stage) = solve_normal_equations(&m, &b).unwrap();
    assert_eq!(stage, SolverStage::Lu);
    assert_relative_eq!(x[0], 1.0, epsilon = 1e-12);
    assert_relative_eq!(x[1], 1.0, epsilon = 1e-12);
}

#[test]
fn test_singular_uses_pseudo_inverse() {
    let m = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
    let b = DVector::from_vec(vec![1.0, 1.0]);

    let (x, stage) = solve_normal_equations(&m, &b).unwrap();
    assert_eq!(stage, SolverStage::EigenPseudoInverse);
    assert_relative_eq!(x[0], 0.5, epsilon = 1e-10);
    assert_relative_eq!(x[1], 0.5, epsilon = 1e-10);
}

#[test]
fn test_covariance_is_inverse_of_m_squared() {
    let m = DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 4.0]));
    let cov = error_covariance(&m).unwrap();
    assert_relative_eq!(cov[(0, 0)], 0.25, epsilon = 1e-12);
    assert_relative_eq!(cov[(1, 1)], 1.0 / 16.0, epsilon = 1e-12);
    assert_relative_eq!(cov[(0, 1)], 0.0, epsilon = 1e-12);
}

#[test]
fn test_covariance_fails_for_singular() {
    let m = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
    assert!(error_covariance(&m).is_err());
}

#[test]
fn test_stage_names() {
    assert_eq!(SolverStage::Ldlt.to_string(), "Cholesky LDL^T");
    assert_eq!(SolverStage::EigenPseudoInverse.to_string(), "eigen-values");
}

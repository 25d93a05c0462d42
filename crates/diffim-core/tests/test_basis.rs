use std::sync::Arc;

use ndarray::Array2;

use diffim_core::error::DiffimError;
use diffim_core::kernel::{
    generate_alard_lupton_basis, generate_basis, generate_delta_function_basis, BasisKind, Kernel,
    LinearCombinationKernel,
};

#[test]
fn test_delta_basis_layout() {
    let basis = generate_delta_function_basis(3, 2).unwrap();
    assert_eq!(basis.len(), 6);
    for (idx, k) in basis.iter().enumerate() {
        let (row, col) = (idx / 3, idx % 3);
        assert_eq!(k.width(), 3);
        assert_eq!(k.height(), 2);
        assert_eq!(k.sum(), 1.0);
        assert_eq!(k.data[[row, col]], 1.0);
        assert_eq!((k.ctr_x, k.ctr_y), (1, 1));
    }
}

#[test]
fn test_delta_basis_rejects_empty_grid() {
    assert!(matches!(
        generate_delta_function_basis(0, 5),
        Err(DiffimError::InvalidParameter(_))
    ));
}

#[test]
fn test_alard_lupton_unimplemented() {
    let kind = BasisKind::AlardLupton {
        sig_gauss: vec![0.7, 1.5, 3.0],
        deg_gauss: vec![4, 3, 2],
    };
    assert!(matches!(
        generate_basis(&kind, 19, 19),
        Err(DiffimError::Unimplemented(_))
    ));
}

#[test]
fn test_alard_lupton_checks_grid_first() {
    assert!(matches!(
        generate_alard_lupton_basis(0, 19, &[1.0], &[2]),
        Err(DiffimError::InvalidParameter(_))
    ));
}

#[test]
fn test_linear_combination_image_and_sum() {
    let basis = generate_delta_function_basis(3, 3).unwrap();
    let mut coefficients = vec![0.0; 9];
    coefficients[4] = 0.6;
    coefficients[1] = 0.1;
    coefficients[7] = 0.1;
    let lck = LinearCombinationKernel::new(basis, coefficients).unwrap();

    let image = lck.compute_image();
    assert_eq!(image.data[[1, 1]], 0.6);
    assert_eq!(image.data[[0, 1]], 0.1);
    assert_eq!(image.data[[2, 1]], 0.1);
    assert_eq!(image.data[[0, 0]], 0.0);
    approx::assert_relative_eq!(lck.kernel_sum(), 0.8, epsilon = 1e-12);
    approx::assert_relative_eq!(image.sum(), lck.kernel_sum(), epsilon = 1e-12);
}

#[test]
fn test_linear_combination_validates() {
    let basis = generate_delta_function_basis(3, 3).unwrap();
    assert!(LinearCombinationKernel::new(basis, vec![1.0; 8]).is_err());

    let mixed: Arc<[Kernel]> = vec![
        Kernel::new(Array2::zeros((3, 3))),
        Kernel::new(Array2::zeros((5, 5))),
    ]
    .into();
    assert!(LinearCombinationKernel::new(mixed, vec![1.0, 1.0]).is_err());

    let empty: Arc<[Kernel]> = Vec::new().into();
    assert!(LinearCombinationKernel::new(empty, vec![]).is_err());
}

#[test]
fn test_kernel_center_validated() {
    assert!(Kernel::with_center(Array2::zeros((3, 3)), 3, 0).is_err());
    assert!(Kernel::with_center(Array2::zeros((3, 3)), 2, 2).is_ok());
}

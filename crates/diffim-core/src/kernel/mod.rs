pub mod basis;

use std::sync::Arc;

use ndarray::Array2;

use crate::error::{DiffimError, Result};

pub use basis::{
    generate_alard_lupton_basis, generate_basis, generate_delta_function_basis, BasisKind,
};

/// Ordered, shared, read-only list of basis kernels.
///
/// Index `i` of the list is parameter `i` of a kernel fit.
pub type BasisKernelList = Arc<[Kernel]>;

/// A fixed convolution kernel with an anchor pixel.
///
/// `data` has shape `(height, width)`; `(ctr_x, ctr_y)` is the kernel pixel
/// that lands on the output pixel during convolution.
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel {
    pub data: Array2<f64>,
    pub ctr_x: usize,
    pub ctr_y: usize,
}

impl Kernel {
    /// Kernel with the conventional center `(width / 2, height / 2)`.
    pub fn new(data: Array2<f64>) -> Self {
        let (h, w) = data.dim();
        Self {
            data,
            ctr_x: w / 2,
            ctr_y: h / 2,
        }
    }

    pub fn with_center(data: Array2<f64>, ctr_x: usize, ctr_y: usize) -> Result<Self> {
        let (h, w) = data.dim();
        if w == 0 || h == 0 || ctr_x >= w || ctr_y >= h {
            return Err(DiffimError::InvalidParameter(format!(
                "kernel center ({ctr_x},{ctr_y}) outside {w}x{h} kernel"
            )));
        }
        Ok(Self { data, ctr_x, ctr_y })
    }

    /// A `width x height` kernel that is 1.0 at `(col, row)` and 0.0 elsewhere.
    pub fn delta_function(width: usize, height: usize, col: usize, row: usize) -> Self {
        let mut data = Array2::<f64>::zeros((height, width));
        data[[row, col]] = 1.0;
        Self::new(data)
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn sum(&self) -> f64 {
        self.data.sum()
    }

    /// True when width, height and center all match.
    pub fn same_geometry(&self, other: &Kernel) -> bool {
        self.data.dim() == other.data.dim() && self.ctr_x == other.ctr_x && self.ctr_y == other.ctr_y
    }
}

/// A kernel defined as a weighted sum of basis kernels.
#[derive(Clone, Debug)]
pub struct LinearCombinationKernel {
    basis: BasisKernelList,
    coefficients: Vec<f64>,
}

impl LinearCombinationKernel {
    pub fn new(basis: BasisKernelList, coefficients: Vec<f64>) -> Result<Self> {
        if basis.is_empty() {
            return Err(DiffimError::InvalidParameter(
                "basis kernel list is empty".into(),
            ));
        }
        if basis.len() != coefficients.len() {
            return Err(DiffimError::InvalidParameter(format!(
                "{} coefficients for {} basis kernels",
                coefficients.len(),
                basis.len()
            )));
        }
        if let Some(k) = basis.iter().find(|k| !k.same_geometry(&basis[0])) {
            return Err(DiffimError::InvalidParameter(format!(
                "basis kernels differ in geometry: {}x{} vs {}x{}",
                k.width(),
                k.height(),
                basis[0].width(),
                basis[0].height()
            )));
        }
        Ok(Self {
            basis,
            coefficients,
        })
    }

    pub fn basis(&self) -> &BasisKernelList {
        &self.basis
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn width(&self) -> usize {
        self.basis[0].width()
    }

    pub fn height(&self) -> usize {
        self.basis[0].height()
    }

    /// Realize the weighted sum as a single kernel image.
    pub fn compute_image(&self) -> Kernel {
        let first = &self.basis[0];
        let mut data = Array2::<f64>::zeros(first.data.dim());
        for (k, &c) in self.basis.iter().zip(&self.coefficients) {
            if c != 0.0 {
                data.scaled_add(c, &k.data);
            }
        }
        Kernel {
            data,
            ctr_x: first.ctr_x,
            ctr_y: first.ctr_y,
        }
    }

    /// Sum of the realized kernel, i.e. its photometric scaling.
    pub fn kernel_sum(&self) -> f64 {
        self.basis
            .iter()
            .zip(&self.coefficients)
            .map(|(k, &c)| c * k.sum())
            .sum()
    }
}

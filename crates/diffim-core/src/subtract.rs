use ndarray::{Array2, Zip};
use num_traits::Float;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::convolve::{convolve, convolve_masked, ConvolutionMethod};
use crate::error::{DiffimError, Result};
use crate::kernel::Kernel;
use crate::masked_image::{check_same_dim, MaskedImage};

/// 2D polynomial `c0 + c1 x + c2 y + c3 x^2 + c4 x y + c5 y^2 + ...`,
/// terms ordered by total degree, then by decreasing power of x.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Polynomial2 {
    order: usize,
    coefficients: Vec<f64>,
}

impl Polynomial2 {
    pub fn new(order: usize, coefficients: Vec<f64>) -> Result<Self> {
        let expected = (order + 1) * (order + 2) / 2;
        if coefficients.len() != expected {
            return Err(DiffimError::InvalidParameter(format!(
                "order {order} polynomial needs {expected} coefficients, got {}",
                coefficients.len()
            )));
        }
        Ok(Self {
            order,
            coefficients,
        })
    }

    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        let mut sum = 0.0;
        let mut idx = 0;
        for degree in 0..=self.order {
            for ypow in 0..=degree {
                let xpow = degree - ypow;
                sum += self.coefficients[idx] * x.powi(xpow as i32) * y.powi(ypow as i32);
                idx += 1;
            }
        }
        sum
    }
}

/// Differential background added to the convolved template.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Background {
    Constant(f64),
    /// Evaluated at parent pixel positions.
    Polynomial(Polynomial2),
}

impl Default for Background {
    fn default() -> Self {
        Self::Constant(0.0)
    }
}

impl Background {
    fn add_to<T: Float>(&self, image: &mut Array2<T>, x0: i64, y0: i64) {
        match self {
            Self::Constant(value) => {
                if *value != 0.0 {
                    let v = T::from(*value).unwrap_or_else(T::nan);
                    image.mapv_inplace(|p| p + v);
                }
            }
            Self::Polynomial(poly) => {
                for ((row, col), p) in image.indexed_iter_mut() {
                    let x = (x0 + col as i64) as f64;
                    let y = (y0 + row as i64) as f64;
                    *p = *p + T::from(poly.evaluate(x, y)).unwrap_or_else(T::nan);
                }
            }
        }
    }
}

/// Difference of a masked template and a science image:
/// `D = (K * T + bg) - I`, negated when `invert` is set.
///
/// Masks are ORed (the convolved template carries `EDGE` on its border
/// band) and variances add.
pub fn convolve_and_subtract<T>(
    to_convolve: &MaskedImage<T>,
    to_not_convolve: &MaskedImage<T>,
    kernel: &Kernel,
    background: &Background,
    invert: bool,
    method: ConvolutionMethod,
) -> Result<MaskedImage<T>>
where
    T: Float + Send + Sync,
{
    to_convolve.check_same_dimensions(to_not_convolve)?;
    debug!(
        width = to_convolve.width(),
        height = to_convolve.height(),
        "Convolving masked template"
    );

    let mut diff = convolve_masked(to_convolve, kernel, method);
    background.add_to(&mut diff.image, diff.x0, diff.y0);

    Zip::from(&mut diff.image)
        .and(&to_not_convolve.image)
        .for_each(|d, &s| *d = *d - s);
    Zip::from(&mut diff.variance)
        .and(&to_not_convolve.variance)
        .for_each(|d, &s| *d = *d + s);
    Zip::from(&mut diff.mask)
        .and(&to_not_convolve.mask)
        .for_each(|d, &s| *d |= s);

    if invert {
        diff.image.mapv_inplace(|v| -v);
    }
    Ok(diff)
}

/// Difference of a bare template image and a masked science image.
///
/// Same arithmetic as [`convolve_and_subtract`]; the science mask and
/// variance planes are copied into the result unchanged.
pub fn convolve_image_and_subtract<T>(
    to_convolve: &Array2<T>,
    to_not_convolve: &MaskedImage<T>,
    kernel: &Kernel,
    background: &Background,
    invert: bool,
    method: ConvolutionMethod,
) -> Result<MaskedImage<T>>
where
    T: Float + Send + Sync,
{
    check_same_dim(to_convolve.dim(), to_not_convolve.dim())?;

    let mut image = convolve(to_convolve, kernel, method);
    background.add_to(&mut image, to_not_convolve.x0, to_not_convolve.y0);
    Zip::from(&mut image)
        .and(&to_not_convolve.image)
        .for_each(|d, &s| *d = *d - s);
    if invert {
        image.mapv_inplace(|v| -v);
    }

    Ok(MaskedImage {
        image,
        mask: to_not_convolve.mask.clone(),
        variance: to_not_convolve.variance.clone(),
        x0: to_not_convolve.x0,
        y0: to_not_convolve.y0,
    })
}

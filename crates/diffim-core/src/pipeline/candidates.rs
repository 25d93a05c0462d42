use tracing::debug;

use crate::error::{DiffimError, Result};
use crate::kernel::LinearCombinationKernel;
use crate::psf_match::KernelSolution;

use super::config::CandidateConfig;

/// Iterative sigma clipping of `values`; returns which ones survive.
///
/// Each iteration computes mean and stddev of the survivors and drops
/// values more than `sigma` standard deviations from the mean. Stops early
/// once nothing changes or the spread vanishes.
pub fn sigma_clip(values: &[f64], config: &CandidateConfig) -> Vec<bool> {
    let mut keep: Vec<bool> = values.iter().map(|v| v.is_finite()).collect();

    for iteration in 0..config.iterations {
        let (mean, stddev) = mean_stddev(values, &keep);
        if stddev < 1e-10 {
            break;
        }
        let lo = mean - config.sigma * stddev;
        let hi = mean + config.sigma * stddev;
        let mut rejected = 0;
        for (k, &v) in keep.iter_mut().zip(values) {
            if *k && (v < lo || v > hi) {
                *k = false;
                rejected += 1;
            }
        }
        debug!(iteration, mean, stddev, rejected, "Kernel sum clipping");
        if rejected == 0 {
            break;
        }
    }
    keep
}

fn mean_stddev(values: &[f64], keep: &[bool]) -> (f64, f64) {
    let kept = || values.iter().zip(keep).filter(|&(_, &k)| k).map(|(&v, _)| v);
    let n = kept().count();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = kept().sum::<f64>() / n as f64;
    let var = kept().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    (mean, var.sqrt())
}

/// Mean kernel and background of several solutions on a shared basis.
pub struct AveragedSolution {
    pub kernel: LinearCombinationKernel,
    /// Standard error of the mean per coefficient.
    pub kernel_error: LinearCombinationKernel,
    pub background: f64,
    pub background_error: f64,
}

/// Average coefficients and backgrounds; uncertainties combine as
/// `sqrt(sum sigma_i^2) / n`.
pub fn average_solutions(solutions: &[&KernelSolution]) -> Result<AveragedSolution> {
    let Some(first) = solutions.first() else {
        return Err(DiffimError::NumericalFailure(
            "no kernel candidate survived".into(),
        ));
    };
    let basis = first.kernel.basis().clone();
    let n_coeff = basis.len();
    let n = solutions.len() as f64;

    let mut coefficients = vec![0.0; n_coeff];
    let mut variances = vec![0.0; n_coeff];
    let (mut background, mut background_var) = (0.0, 0.0);
    for solution in solutions {
        let coeffs = solution.kernel.coefficients();
        let errors = solution.kernel_error.coefficients();
        if coeffs.len() != n_coeff {
            return Err(DiffimError::InvalidParameter(
                "kernel candidates use different bases".into(),
            ));
        }
        for i in 0..n_coeff {
            coefficients[i] += coeffs[i];
            variances[i] += errors[i] * errors[i];
        }
        background += solution.background;
        background_var += solution.background_error * solution.background_error;
    }

    coefficients.iter_mut().for_each(|c| *c /= n);
    let errors = variances.iter().map(|v| v.sqrt() / n).collect();

    Ok(AveragedSolution {
        kernel: LinearCombinationKernel::new(basis.clone(), coefficients)?,
        kernel_error: LinearCombinationKernel::new(basis, errors)?,
        background: background / n,
        background_error: background_var.sqrt() / n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outlier_rejected() {
        let mut values: Vec<f64> = (0..20)
            .map(|i| if i % 2 == 0 { 0.99 } else { 1.01 })
            .collect();
        values[11] = 5.0;
        let keep = sigma_clip(&values, &CandidateConfig::default());
        assert!(!keep[11]);
        assert_eq!(keep.iter().filter(|&&k| k).count(), 19);
    }

    #[test]
    fn test_identical_values_all_kept() {
        let keep = sigma_clip(&[2.0; 5], &CandidateConfig::default());
        assert!(keep.iter().all(|&k| k));
    }

    #[test]
    fn test_nan_never_kept() {
        let keep = sigma_clip(&[1.0, f64::NAN, 1.0], &CandidateConfig::default());
        assert_eq!(keep, vec![true, false, true]);
    }
}

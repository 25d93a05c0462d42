use ndarray::Array2;
use num_traits::Float;
use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_CANDIDATE_CLIP_ITERATIONS, DEFAULT_CANDIDATE_CLIP_SIGMA, DEFAULT_GAIN,
    DEFAULT_KERNEL_COLS, DEFAULT_KERNEL_ROWS, DEFAULT_READ_NOISE,
};
use crate::convolve::ConvolutionMethod;
use crate::dia_source::DiaSourceConfig;
use crate::error::{DiffimError, Result};
use crate::kernel::BasisKind;
use crate::selection::FootprintConfig;

/// Everything `run_subtraction` needs besides the two images.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiffimConfig {
    #[serde(default)]
    pub convolution: ConvolutionMethod,
    /// Report `science - model` instead of `model - science`.
    #[serde(default = "default_invert")]
    pub invert: bool,
    #[serde(default)]
    pub kernel: KernelConfig,
    #[serde(default)]
    pub footprints: FootprintConfig,
    #[serde(default)]
    pub candidates: CandidateConfig,
    #[serde(default)]
    pub variance: VarianceModel,
    #[serde(default)]
    pub dia_source: DiaSourceConfig,
}

fn default_invert() -> bool {
    true
}

impl Default for DiffimConfig {
    fn default() -> Self {
        Self {
            convolution: ConvolutionMethod::default(),
            invert: default_invert(),
            kernel: KernelConfig::default(),
            footprints: FootprintConfig::default(),
            candidates: CandidateConfig::default(),
            variance: VarianceModel::default(),
            dia_source: DiaSourceConfig::default(),
        }
    }
}

impl DiffimConfig {
    pub fn validate(&self) -> Result<()> {
        self.kernel.validate()?;
        self.footprints.validate()?;
        self.candidates.validate()?;
        self.variance.validate()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KernelConfig {
    #[serde(default = "default_kernel_cols", alias = "kernelCols")]
    pub kernel_cols: usize,
    #[serde(default = "default_kernel_rows", alias = "kernelRows")]
    pub kernel_rows: usize,
    #[serde(default)]
    pub basis: BasisKind,
}

fn default_kernel_cols() -> usize {
    DEFAULT_KERNEL_COLS
}
fn default_kernel_rows() -> usize {
    DEFAULT_KERNEL_ROWS
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            kernel_cols: DEFAULT_KERNEL_COLS,
            kernel_rows: DEFAULT_KERNEL_ROWS,
            basis: BasisKind::default(),
        }
    }
}

impl KernelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.kernel_cols < 1 || self.kernel_rows < 1 {
            return Err(DiffimError::InvalidParameter(format!(
                "kernel rows and cols must be positive (got {}x{})",
                self.kernel_cols, self.kernel_rows
            )));
        }
        Ok(())
    }
}

/// Iterative clipping of candidate kernels on their kernel sum.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateConfig {
    /// Candidates beyond mean +/- sigma*stddev are rejected.
    pub sigma: f64,
    pub iterations: usize,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            sigma: DEFAULT_CANDIDATE_CLIP_SIGMA,
            iterations: DEFAULT_CANDIDATE_CLIP_ITERATIONS,
        }
    }
}

impl CandidateConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.sigma > 0.0) {
            return Err(DiffimError::InvalidParameter(format!(
                "candidate clip sigma must be positive, got {}",
                self.sigma
            )));
        }
        Ok(())
    }
}

/// Noise model for images that arrive without a variance plane:
/// `var = max(pixel, 0) / gain + read_noise^2`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VarianceModel {
    pub gain: f64,
    pub read_noise: f64,
}

impl Default for VarianceModel {
    fn default() -> Self {
        Self {
            gain: DEFAULT_GAIN,
            read_noise: DEFAULT_READ_NOISE,
        }
    }
}

impl VarianceModel {
    pub fn validate(&self) -> Result<()> {
        if !(self.gain > 0.0) || self.read_noise < 0.0 {
            return Err(DiffimError::InvalidParameter(format!(
                "variance model needs gain > 0 and read_noise >= 0 (got {}, {})",
                self.gain, self.read_noise
            )));
        }
        Ok(())
    }

    pub fn variance_plane<T: Float>(&self, image: &Array2<T>) -> Array2<T> {
        let floor = self.read_noise * self.read_noise;
        image.mapv(|v| {
            let counts = v.to_f64().unwrap_or(0.0).max(0.0);
            T::from(counts / self.gain + floor).unwrap_or_else(T::nan)
        })
    }
}

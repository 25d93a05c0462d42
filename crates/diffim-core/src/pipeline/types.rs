use crate::detection::Footprint;
use crate::kernel::LinearCombinationKernel;
use crate::masked_image::MaskedImage;
use crate::psf_match::KernelSolution;
use crate::stats::ImageStatistics;

/// Subtraction stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    FootprintSearch,
    KernelFitting,
    CandidateClipping,
    Subtraction,
    Statistics,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FootprintSearch => write!(f, "Searching footprints"),
            Self::KernelFitting => write!(f, "Fitting kernels"),
            Self::CandidateClipping => write!(f, "Clipping candidates"),
            Self::Subtraction => write!(f, "Subtracting"),
            Self::Statistics => write!(f, "Measuring residuals"),
        }
    }
}

/// Thread-safe progress reporting for the subtraction pipeline.
///
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of work items
    /// in this stage (e.g. footprint count), if known.
    fn begin_stage(&self, _stage: PipelineStage, _total_items: Option<usize>) {}

    /// One work item within the current stage has completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// No-op progress reporter, used when `run_subtraction` delegates.
pub(super) struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// One footprint's kernel fit.
#[derive(Clone, Debug)]
pub struct KernelCandidate {
    /// Grown footprint the kernel was fit on.
    pub footprint: Footprint,
    pub solution: KernelSolution,
    pub kernel_sum: f64,
    /// Survived kernel-sum clipping.
    pub accepted: bool,
    /// Normalized residuals of the final difference under the footprint.
    pub statistics: ImageStatistics,
}

/// Result of [`run_subtraction`](super::run_subtraction).
#[derive(Clone, Debug)]
pub struct SubtractionOutput<T> {
    pub difference: MaskedImage<T>,
    /// Mean of the accepted candidate kernels.
    pub kernel: LinearCombinationKernel,
    pub kernel_error: LinearCombinationKernel,
    pub background: f64,
    pub background_error: f64,
    /// Every successful fit, accepted or not.
    pub candidates: Vec<KernelCandidate>,
    /// Threshold at which the footprints were found.
    pub detection_threshold: f64,
    /// Normalized residuals over all unmasked pixels.
    pub statistics: ImageStatistics,
}

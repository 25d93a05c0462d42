//! End-to-end subtraction: footprint search, per-footprint kernel fits,
//! candidate clipping, and the final convolve-and-subtract.

pub mod candidates;
pub mod config;
mod types;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ndarray::Zip;
use num_traits::Float;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::consts::PARALLEL_CANDIDATE_THRESHOLD;
use crate::detection::Footprint;
use crate::error::Result;
use crate::kernel::generate_basis;
use crate::mask::plane_bit_mask;
use crate::masked_image::MaskedImage;
use crate::psf_match::{KernelSolution, PsfMatchingFunctor};
use crate::selection::select_footprints_for_psf_matching;
use crate::stats::ImageStatistics;
use crate::subtract::{convolve_and_subtract, Background};

pub use candidates::{average_solutions, sigma_clip, AveragedSolution};
pub use config::{CandidateConfig, DiffimConfig, KernelConfig, VarianceModel};
pub use types::{KernelCandidate, PipelineStage, ProgressReporter, SubtractionOutput};

use types::NoOpReporter;

/// Match `template` to `science` and subtract.
pub fn run_subtraction<T>(
    template: &MaskedImage<T>,
    science: &MaskedImage<T>,
    config: &DiffimConfig,
) -> Result<SubtractionOutput<T>>
where
    T: Float + Send + Sync,
{
    run_subtraction_reported(template, science, config, Arc::new(NoOpReporter))
}

/// [`run_subtraction`] with a thread-safe progress reporter.
pub fn run_subtraction_reported<T>(
    template: &MaskedImage<T>,
    science: &MaskedImage<T>,
    config: &DiffimConfig,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<SubtractionOutput<T>>
where
    T: Float + Send + Sync,
{
    config.validate()?;
    template.check_same_dimensions(science)?;
    let pipeline_start = Instant::now();
    let (kernel_cols, kernel_rows) = (config.kernel.kernel_cols, config.kernel.kernel_rows);

    let basis = generate_basis(&config.kernel.basis, kernel_cols, kernel_rows)?;
    info!(
        basis = %config.kernel.basis,
        count = basis.len(),
        kernel_cols,
        kernel_rows,
        "Basis generated"
    );

    reporter.begin_stage(PipelineStage::FootprintSearch, None);
    let selection = select_footprints_for_psf_matching(
        template,
        science,
        &config.footprints,
        kernel_cols,
        kernel_rows,
    )?;
    reporter.finish_stage();

    let total = selection.footprints.len();
    reporter.begin_stage(PipelineStage::KernelFitting, Some(total));
    let functor = PsfMatchingFunctor::new(basis).with_convolution(config.convolution);
    let done = AtomicUsize::new(0);
    let fit = |footprint: &Footprint| {
        let result = fit_footprint(&functor, template, science, footprint, kernel_cols, kernel_rows);
        reporter.advance(done.fetch_add(1, Ordering::Relaxed) + 1);
        result.map(|solution| (footprint.clone(), solution))
    };
    let fits: Vec<Result<(Footprint, KernelSolution)>> =
        if total >= PARALLEL_CANDIDATE_THRESHOLD {
            selection.footprints.par_iter().map(fit).collect()
        } else {
            selection.footprints.iter().map(fit).collect()
        };
    reporter.finish_stage();

    let mut candidates: Vec<KernelCandidate> = Vec::with_capacity(total);
    for fit in fits {
        match fit {
            Ok((footprint, solution)) => {
                let kernel_sum = solution.kernel.kernel_sum();
                candidates.push(KernelCandidate {
                    footprint,
                    solution,
                    kernel_sum,
                    accepted: true,
                    statistics: ImageStatistics::default(),
                });
            }
            Err(e) => debug!(error = %e, "Kernel candidate dropped"),
        }
    }
    if candidates.len() < total {
        warn!(
            fitted = candidates.len(),
            total, "Some footprints could not be fit"
        );
    }

    reporter.begin_stage(PipelineStage::CandidateClipping, Some(candidates.len()));
    let sums: Vec<f64> = candidates.iter().map(|c| c.kernel_sum).collect();
    let keep = sigma_clip(&sums, &config.candidates);
    for (candidate, kept) in candidates.iter_mut().zip(keep) {
        candidate.accepted = kept;
    }
    let accepted: Vec<&KernelSolution> = candidates
        .iter()
        .filter(|c| c.accepted)
        .map(|c| &c.solution)
        .collect();
    info!(
        accepted = accepted.len(),
        fitted = candidates.len(),
        "Kernel candidates clipped"
    );
    let averaged = average_solutions(&accepted)?;
    reporter.finish_stage();
    info!(
        kernel_sum = averaged.kernel.kernel_sum(),
        background = averaged.background,
        "Mean kernel solution"
    );

    reporter.begin_stage(PipelineStage::Subtraction, None);
    let difference = convolve_and_subtract(
        template,
        science,
        &averaged.kernel.compute_image(),
        &Background::Constant(averaged.background),
        config.invert,
        config.convolution,
    )?;
    reporter.finish_stage();

    reporter.begin_stage(PipelineStage::Statistics, Some(candidates.len()));
    let bad = plane_bit_mask(&config.dia_source.bad_mask_planes);
    for candidate in &mut candidates {
        candidate.statistics =
            ImageStatistics::compute_in_footprint(&difference, &candidate.footprint, bad);
    }
    let statistics = ImageStatistics::compute(&difference, bad);
    reporter.finish_stage();

    info!(
        mean = statistics.mean,
        variance = statistics.variance,
        count = statistics.count,
        elapsed_ms = pipeline_start.elapsed().as_millis() as u64,
        "Subtraction complete"
    );

    Ok(SubtractionOutput {
        difference,
        kernel: averaged.kernel,
        kernel_error: averaged.kernel_error,
        background: averaged.background,
        background_error: averaged.background_error,
        candidates,
        detection_threshold: selection.threshold,
        statistics,
    })
}

/// Fit one kernel on the region of `footprint`, weighting by the summed
/// variance of both images.
fn fit_footprint<T>(
    functor: &PsfMatchingFunctor,
    template: &MaskedImage<T>,
    science: &MaskedImage<T>,
    footprint: &Footprint,
    kernel_cols: usize,
    kernel_rows: usize,
) -> Result<KernelSolution>
where
    T: Float + Send + Sync,
{
    let bbox = footprint.bbox();
    let t = template.sub_image(&bbox)?;
    let s = science.sub_image(&bbox)?;
    let mut variance = s.variance.clone();
    Zip::from(&mut variance)
        .and(&t.variance)
        .for_each(|v, &tv| *v = *v + tv);
    functor.apply(&t.image, &s.image, &variance, kernel_cols, kernel_rows)
}

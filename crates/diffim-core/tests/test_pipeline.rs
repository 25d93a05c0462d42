mod common;

use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use ndarray::Array2;

use diffim_core::convolve::{convolve, ConvolutionMethod};
use diffim_core::detection::ThresholdType;
use diffim_core::error::DiffimError;
use diffim_core::kernel::{BasisKind, Kernel};
use diffim_core::mask::EDGE;
use diffim_core::masked_image::MaskedImage;
use diffim_core::pipeline::{
    run_subtraction, run_subtraction_reported, DiffimConfig, KernelConfig, PipelineStage,
    ProgressReporter,
};
use diffim_core::selection::FootprintConfig;

use common::{grid_positions, masked, noise, star_field};

const VARIANCE: f64 = 1e-4;

fn blur() -> Kernel {
    let mut data = Array2::<f64>::zeros((3, 3));
    data[[1, 1]] = 0.6;
    data[[0, 1]] = 0.1;
    data[[2, 1]] = 0.1;
    data[[1, 0]] = 0.1;
    data[[1, 2]] = 0.1;
    Kernel::new(data)
}

/// Template with nine stars on a textured background; science is the
/// template blurred by [`blur`] plus a 0.01 offset.
fn scene() -> (MaskedImage<f64>, MaskedImage<f64>) {
    let positions = grid_positions(160, 160, 40, 40);
    assert_eq!(positions.len(), 9);
    let template = star_field(160, 160, &positions, 1.0) + noise(160, 160, 17, 0.2);
    let science = convolve(&template, &blur(), ConvolutionMethod::Direct) + 0.01;
    (masked(template, VARIANCE), masked(science, VARIANCE))
}

fn config() -> DiffimConfig {
    DiffimConfig {
        convolution: ConvolutionMethod::Direct,
        invert: false,
        kernel: KernelConfig {
            kernel_cols: 5,
            kernel_rows: 5,
            basis: BasisKind::DeltaFunction,
        },
        footprints: FootprintConfig {
            min_clean_fp: 5,
            det_threshold: 0.5,
            det_threshold_min: 0.1,
            det_threshold_type: ThresholdType::Value,
            ..FootprintConfig::default()
        },
        ..DiffimConfig::default()
    }
}

#[test]
fn test_recovers_blur_and_background() {
    let (template, science) = scene();
    let output = run_subtraction(&template, &science, &config()).unwrap();

    assert_eq!(output.candidates.len(), 9);
    assert!(output.candidates.iter().all(|c| c.accepted));
    assert_eq!(output.detection_threshold, 0.5);

    assert_relative_eq!(output.kernel.kernel_sum(), 1.0, epsilon = 1e-6);
    assert_relative_eq!(output.background, 0.01, epsilon = 1e-6);
    let image = output.kernel.compute_image();
    assert_relative_eq!(image.data[[2, 2]], 0.6, epsilon = 1e-6);
    assert_relative_eq!(image.data[[1, 2]], 0.1, epsilon = 1e-6);
    assert!(image.data[[0, 0]].abs() < 1e-6);

    let diff = &output.difference;
    let mut checked = 0;
    for ((row, col), &v) in diff.image.indexed_iter() {
        if diff.mask[[row, col]] & EDGE != 0 {
            continue;
        }
        assert!(v.abs() < 1e-6, "residual {v} at ({col}, {row})");
        checked += 1;
    }
    assert_eq!(checked, 156 * 156);
    assert_eq!(output.statistics.count, 156 * 156);
    assert!(output.statistics.rms < 1e-2);
}

#[test]
fn test_invert_flips_difference() {
    let (template, science) = scene();
    let cfg = config();
    let plain = run_subtraction(&template, &science, &cfg).unwrap();
    let inverted = run_subtraction(
        &template,
        &science,
        &DiffimConfig {
            invert: true,
            ..cfg
        },
    )
    .unwrap();
    for (a, b) in plain
        .difference
        .image
        .iter()
        .zip(inverted.difference.image.iter())
    {
        assert_eq!(*a, -*b);
    }
}

#[test]
fn test_fit_errors_are_reported() {
    let (template, science) = scene();
    let output = run_subtraction(&template, &science, &config()).unwrap();

    assert!(output.background_error.is_finite() && output.background_error > 0.0);
    assert!(output
        .kernel_error
        .coefficients()
        .iter()
        .all(|e| e.is_finite() && *e >= 0.0));
    for candidate in &output.candidates {
        assert_relative_eq!(candidate.kernel_sum, 1.0, epsilon = 1e-6);
        assert!(candidate.statistics.count > 0);
    }
}

#[derive(Default)]
struct RecordingReporter {
    stages: Mutex<Vec<PipelineStage>>,
    advanced: Mutex<usize>,
}

impl ProgressReporter for RecordingReporter {
    fn begin_stage(&self, stage: PipelineStage, _total_items: Option<usize>) {
        self.stages.lock().unwrap().push(stage);
    }

    fn advance(&self, _items_done: usize) {
        *self.advanced.lock().unwrap() += 1;
    }
}

#[test]
fn test_reporter_sees_every_stage() {
    let (template, science) = scene();
    let reporter = Arc::new(RecordingReporter::default());
    run_subtraction_reported(&template, &science, &config(), reporter.clone()).unwrap();

    assert_eq!(
        *reporter.stages.lock().unwrap(),
        vec![
            PipelineStage::FootprintSearch,
            PipelineStage::KernelFitting,
            PipelineStage::CandidateClipping,
            PipelineStage::Subtraction,
            PipelineStage::Statistics,
        ]
    );
    assert_eq!(*reporter.advanced.lock().unwrap(), 9);
}

#[test]
fn test_featureless_images_have_no_usable_region() {
    let flat = masked(Array2::from_elem((64, 64), 0.1), VARIANCE);
    match run_subtraction(&flat, &flat, &config()) {
        Err(DiffimError::NoUsableRegion { threshold }) => assert_eq!(threshold, 0.125),
        other => panic!("expected NoUsableRegion, got {:?}", other.err()),
    }
}

#[test]
fn test_alard_lupton_is_unimplemented() {
    let (template, science) = scene();
    let cfg = DiffimConfig {
        kernel: KernelConfig {
            kernel_cols: 5,
            kernel_rows: 5,
            basis: BasisKind::AlardLupton {
                sig_gauss: vec![0.7, 1.5],
                deg_gauss: vec![2, 1],
            },
        },
        ..config()
    };
    assert!(matches!(
        run_subtraction(&template, &science, &cfg),
        Err(DiffimError::Unimplemented(_))
    ));
}

#[test]
fn test_invalid_config_and_dimensions() {
    let (template, science) = scene();
    let mut cfg = config();
    cfg.kernel.kernel_cols = 0;
    assert!(matches!(
        run_subtraction(&template, &science, &cfg),
        Err(DiffimError::InvalidParameter(_))
    ));

    let small = masked(Array2::zeros((20, 20)), VARIANCE);
    assert!(matches!(
        run_subtraction(&template, &small, &config()),
        Err(DiffimError::DimensionMismatch { .. })
    ));
}

use diffim_core::consts::{DEFAULT_KERNEL_COLS, DEFAULT_MIN_CLEAN_FP};
use diffim_core::convolve::ConvolutionMethod;
use diffim_core::detection::ThresholdType;
use diffim_core::kernel::BasisKind;
use diffim_core::pipeline::DiffimConfig;

#[test]
fn test_defaults() {
    let config = DiffimConfig::default();
    assert!(config.invert);
    assert_eq!(config.convolution, ConvolutionMethod::Auto);
    assert_eq!(config.kernel.kernel_cols, DEFAULT_KERNEL_COLS);
    assert_eq!(config.kernel.basis, BasisKind::DeltaFunction);
    assert_eq!(config.footprints.min_clean_fp, DEFAULT_MIN_CLEAN_FP);
    assert_eq!(config.footprints.det_threshold_type, ThresholdType::Stdev);
    assert_eq!(
        config.dia_source.bad_mask_planes,
        vec!["NO_DATA", "EDGE", "SAT", "BAD"]
    );
    assert!(config.validate().is_ok());
}

#[test]
fn test_toml_roundtrip() {
    let mut config = DiffimConfig::default();
    config.kernel.kernel_cols = 11;
    config.footprints.det_threshold_type = ThresholdType::Variance;
    config.candidates.sigma = 2.5;

    let text = toml::to_string_pretty(&config).unwrap();
    let back: DiffimConfig = toml::from_str(&text).unwrap();
    assert_eq!(back, config);
}

#[test]
fn test_json_roundtrip() {
    let mut config = DiffimConfig::default();
    config.kernel.basis = BasisKind::AlardLupton {
        sig_gauss: vec![0.7, 1.5, 3.0],
        deg_gauss: vec![4, 3, 2],
    };
    let text = serde_json::to_string(&config).unwrap();
    let back: DiffimConfig = serde_json::from_str(&text).unwrap();
    assert_eq!(back, config);
}

#[test]
fn test_empty_toml_is_default() {
    let config: DiffimConfig = toml::from_str("").unwrap();
    assert_eq!(config, DiffimConfig::default());
}

#[test]
fn test_partial_toml_with_camel_case_names() {
    let text = r#"
        convolution = "Fft"
        invert = false

        [kernel]
        kernelCols = 9
        kernelRows = 7

        [footprints]
        detThreshold = 5.0
        detThresholdType = "value"
        minCleanFp = 3

        [candidates]
        sigma = 2.0

        [dia_source]
        fBadPixels = 0.2
        srcBadMaskPlanes = ["BAD"]
    "#;
    let config: DiffimConfig = toml::from_str(text).unwrap();

    assert_eq!(config.convolution, ConvolutionMethod::Fft);
    assert!(!config.invert);
    assert_eq!((config.kernel.kernel_cols, config.kernel.kernel_rows), (9, 7));
    assert_eq!(config.footprints.det_threshold, 5.0);
    assert_eq!(config.footprints.det_threshold_type, ThresholdType::Value);
    assert_eq!(config.footprints.min_clean_fp, 3);
    assert_eq!(config.footprints.fp_npix_max, 500);
    assert_eq!(config.candidates.sigma, 2.0);
    assert_eq!(config.candidates.iterations, 3);
    assert_eq!(config.dia_source.f_bad_pixels, 0.2);
    assert_eq!(config.dia_source.bad_mask_planes, vec!["BAD"]);
    assert_eq!(config.dia_source.n_good_ratio, 0.5);
}

#[test]
fn test_alard_lupton_table() {
    let text = r#"
        [kernel.basis.AlardLupton]
        sig_gauss = [0.7, 1.5]
        deg_gauss = [2, 1]
    "#;
    let config: DiffimConfig = toml::from_str(text).unwrap();
    assert_eq!(
        config.kernel.basis,
        BasisKind::AlardLupton {
            sig_gauss: vec![0.7, 1.5],
            deg_gauss: vec![2, 1],
        }
    );
}

#[test]
fn test_validation_catches_bad_values() {
    let mut config = DiffimConfig::default();
    config.footprints.det_threshold_scaling = 1.5;
    assert!(config.validate().is_err());

    let mut config = DiffimConfig::default();
    config.kernel.kernel_rows = 0;
    assert!(config.validate().is_err());

    let mut config = DiffimConfig::default();
    config.candidates.sigma = 0.0;
    assert!(config.validate().is_err());

    let mut config = DiffimConfig::default();
    config.variance.gain = -1.0;
    assert!(config.validate().is_err());
}

#[test]
fn test_unknown_threshold_type_rejected() {
    let text = r#"
        [footprints]
        det_threshold_type = "median"
    "#;
    assert!(toml::from_str::<DiffimConfig>(text).is_err());
}

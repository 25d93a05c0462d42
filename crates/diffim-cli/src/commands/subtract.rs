use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use diffim_core::convolve::ConvolutionMethod;
use diffim_core::detection::{Polarity, Threshold, ThresholdType};
use diffim_core::dia_source::DiaSourceAnalyst;
use diffim_core::io::save_image;
use diffim_core::pipeline::{run_subtraction_reported, PipelineStage, ProgressReporter};
use indicatif::{ProgressBar, ProgressStyle};

use super::input::{load_config, load_input};
use crate::summary::{print_subtraction_result, print_subtraction_summary};

#[derive(Clone, Copy, ValueEnum)]
pub enum ConvolutionArg {
    Auto,
    Direct,
    Fft,
}

impl From<ConvolutionArg> for ConvolutionMethod {
    fn from(arg: ConvolutionArg) -> Self {
        match arg {
            ConvolutionArg::Auto => Self::Auto,
            ConvolutionArg::Direct => Self::Direct,
            ConvolutionArg::Fft => Self::Fft,
        }
    }
}

#[derive(Args)]
pub struct SubtractArgs {
    /// Template image (convolved)
    pub template: PathBuf,

    /// Science image
    pub science: PathBuf,

    /// Config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Mask image for the template (nonzero = bad)
    #[arg(long)]
    pub template_mask: Option<PathBuf>,

    /// Mask image for the science image (nonzero = bad)
    #[arg(long)]
    pub science_mask: Option<PathBuf>,

    /// Square kernel size, overriding the config
    #[arg(long)]
    pub kernel_size: Option<usize>,

    /// Convolution method, overriding the config
    #[arg(long, value_enum)]
    pub convolution: Option<ConvolutionArg>,

    /// Report science - template (true) or template - science (false)
    #[arg(long)]
    pub invert: Option<bool>,

    /// Difference image (.raw keeps all planes exactly)
    #[arg(short, long, default_value = "difference.raw")]
    pub output: PathBuf,

    /// Stretched preview of the difference (.tiff or .png)
    #[arg(long)]
    pub preview: Option<PathBuf>,

    /// Detect and vet sources on the difference above this many sigma
    #[arg(long)]
    pub sources: Option<f64>,
}

/// Drives an indicatif bar from pipeline stages.
struct BarReporter {
    bar: ProgressBar,
}

impl ProgressReporter for BarReporter {
    fn begin_stage(&self, stage: PipelineStage, total_items: Option<usize>) {
        self.bar.set_message(stage.to_string());
        self.bar.set_length(total_items.unwrap_or(1) as u64);
        self.bar.set_position(0);
    }

    fn advance(&self, items_done: usize) {
        self.bar.set_position(items_done as u64);
    }

    fn finish_stage(&self) {
        if let Some(len) = self.bar.length() {
            self.bar.set_position(len);
        }
    }
}

pub fn run(args: &SubtractArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(size) = args.kernel_size {
        config.kernel.kernel_cols = size;
        config.kernel.kernel_rows = size;
    }
    if let Some(method) = args.convolution {
        config.convolution = method.into();
    }
    if let Some(invert) = args.invert {
        config.invert = invert;
    }

    print_subtraction_summary(&config, &args.template, &args.science, &args.output);

    let template = load_input(
        &args.template,
        args.template_mask.as_deref(),
        &config.variance,
    )?;
    let science = load_input(&args.science, args.science_mask.as_deref(), &config.variance)?;

    let bar = ProgressBar::new(1);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg:22} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    let reporter = Arc::new(BarReporter { bar: bar.clone() });
    let mut output = run_subtraction_reported(&template, &science, &config, reporter)
        .context("Subtraction failed")?;
    bar.finish_with_message("Done");

    print_subtraction_result(&output);

    if let Some(sigma) = args.sources {
        let analyst = DiaSourceAnalyst::new(config.dia_source.clone());
        let threshold = Threshold::new(sigma, ThresholdType::Variance);
        let sources = analyst.detect_dia_sources(
            &mut output.difference,
            &threshold,
            config.footprints.fp_npix_min,
        );
        println!(
            "{:>5}  {:>6}  {:>6}  {:>8}  {:>12}  {}",
            "#", "x", "y", "npix", "flux", "status"
        );
        println!("{}", "-".repeat(52));
        for (i, source) in sources.iter().enumerate() {
            let peak = source.footprint.peak();
            let sign = match source.polarity {
                Polarity::Positive => "+",
                Polarity::Negative => "-",
            };
            println!(
                "{:>5}  {:>6}  {:>6}  {:>8}  {:>12.5}  {}{}",
                i + 1,
                peak.x,
                peak.y,
                source.footprint.npix(),
                source.flux,
                sign,
                if source.accepted { "ok" } else { "rejected" }
            );
        }
        println!();
    }

    save_image(&output.difference, &args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    println!("Difference saved to {}", args.output.display());

    if let Some(ref preview) = args.preview {
        save_image(&output.difference, preview)
            .with_context(|| format!("Failed to write {}", preview.display()))?;
        println!("Preview saved to {}", preview.display());
    }

    Ok(())
}

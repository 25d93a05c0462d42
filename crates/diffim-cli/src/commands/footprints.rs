use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use diffim_core::selection::select_footprints_for_psf_matching;

use super::input::{load_config, load_input};

#[derive(Args)]
pub struct FootprintsArgs {
    /// Template image (searched for sources)
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

    /// Show first N footprints only
    #[arg(long, default_value = "50")]
    pub top: usize,
}

pub fn run(args: &FootprintsArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let template = load_input(
        &args.template,
        args.template_mask.as_deref(),
        &config.variance,
    )?;
    let science = load_input(&args.science, args.science_mask.as_deref(), &config.variance)?;

    let selection = select_footprints_for_psf_matching(
        &template,
        &science,
        &config.footprints,
        config.kernel.kernel_cols,
        config.kernel.kernel_rows,
    )
    .context("Footprint search failed")?;

    let total = selection.footprints.len();
    println!(
        "\n{} clean footprints at threshold {:.3} ({} pass{}):",
        total,
        selection.threshold,
        selection.passes,
        if selection.passes == 1 { "" } else { "es" }
    );
    println!(
        "{:>5}  {:>6}  {:>6}  {:>10}  {:>6}  {:>12}",
        "#", "x", "y", "size", "npix", "peak"
    );
    println!("{}", "-".repeat(54));

    for (i, fp) in selection.footprints.iter().take(args.top).enumerate() {
        let bbox = fp.bbox();
        let peak = fp.peak();
        println!(
            "{:>5}  {:>6}  {:>6}  {:>10}  {:>6}  {:>12.5}",
            i + 1,
            peak.x,
            peak.y,
            format!("{}x{}", bbox.width, bbox.height),
            fp.npix(),
            peak.value
        );
    }
    if total > args.top {
        println!("  ... {} more", total - args.top);
    }

    Ok(())
}

use std::path::Path;

use console::Style;
use diffim_core::kernel::BasisKind;
use diffim_core::pipeline::{DiffimConfig, SubtractionOutput};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

pub fn print_subtraction_summary(
    config: &DiffimConfig,
    template: &Path,
    science: &Path,
    output: &Path,
) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Image Subtraction"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(17)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Template"),
        s.path.apply_to(template.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Science"),
        s.path.apply_to(science.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(output.display())
    );
    println!();

    println!("  {}", s.header.apply_to("Kernel"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Size"),
        s.value.apply_to(format!(
            "{}x{}",
            config.kernel.kernel_cols, config.kernel.kernel_rows
        ))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Basis"),
        s.method.apply_to(&config.kernel.basis)
    );
    if let BasisKind::AlardLupton {
        sig_gauss,
        deg_gauss,
    } = &config.kernel.basis
    {
        println!("    {:<12}{:?}", s.label.apply_to("Sigmas"), sig_gauss);
        println!("    {:<12}{:?}", s.label.apply_to("Degrees"), deg_gauss);
    }
    println!(
        "    {:<12}{}",
        s.label.apply_to("Convolve"),
        s.method.apply_to(config.convolution)
    );
    println!();

    let fp = &config.footprints;
    println!("  {}", s.header.apply_to("Footprints"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Threshold"),
        s.value.apply_to(format!(
            "{} ({}) x{} down to {}",
            fp.det_threshold, fp.det_threshold_type, fp.det_threshold_scaling, fp.det_threshold_min
        ))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Pixels"),
        s.value.apply_to(format!("{}..={}", fp.fp_npix_min, fp.fp_npix_max))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Grow"),
        s.value.apply_to(format!(
            "{} px",
            fp.grow_pixels(config.kernel.kernel_cols, config.kernel.kernel_rows)
        ))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Wanted"),
        s.value.apply_to(fp.min_clean_fp)
    );
    println!();

    println!("  {}", s.header.apply_to("Candidates"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Sigma"),
        s.value.apply_to(config.candidates.sigma)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Iterations"),
        s.value.apply_to(config.candidates.iterations)
    );
    println!();

    if config.invert {
        println!(
            "  {:<14}{}",
            s.header.apply_to("Difference"),
            s.value.apply_to("science - template")
        );
    } else {
        println!(
            "  {:<14}{}",
            s.header.apply_to("Difference"),
            s.disabled.apply_to("template - science")
        );
    }
    println!();
}

pub fn print_subtraction_result<T>(output: &SubtractionOutput<T>) {
    let s = Styles::new();
    let accepted = output.candidates.iter().filter(|c| c.accepted).count();

    println!();
    println!("  {}", s.header.apply_to("Result"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Threshold"),
        s.value.apply_to(format!("{:.3}", output.detection_threshold))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Candidates"),
        s.value
            .apply_to(format!("{accepted} of {}", output.candidates.len()))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Kernel sum"),
        s.value.apply_to(format!("{:.6}", output.kernel.kernel_sum()))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Background"),
        s.value.apply_to(format!(
            "{:.6} +/- {:.6}",
            output.background, output.background_error
        ))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Residuals"),
        s.value.apply_to(format!(
            "mean {:.3}  var {:.3}  ({} px)",
            output.statistics.mean, output.statistics.variance, output.statistics.count
        ))
    );
    println!();
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use diffim_core::kernel::generate_basis;

use super::input::load_config;

#[derive(Args)]
pub struct BasisArgs {
    /// Config file (TOML); its kernel section selects the basis
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Kernel width, overriding the config
    #[arg(long)]
    pub cols: Option<usize>,

    /// Kernel height, overriding the config
    #[arg(long)]
    pub rows: Option<usize>,
}

pub fn run(args: &BasisArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let cols = args.cols.unwrap_or(config.kernel.kernel_cols);
    let rows = args.rows.unwrap_or(config.kernel.kernel_rows);

    let basis = generate_basis(&config.kernel.basis, cols, rows)?;
    let first = basis.first().context("Basis is empty")?;
    println!("Basis:    {}", config.kernel.basis);
    println!("Kernels:  {}", basis.len());
    println!("Size:     {}x{}", first.width(), first.height());
    println!("Center:   ({}, {})", first.ctr_x, first.ctr_y);
    println!("Sum:      {:.6}", first.sum());

    Ok(())
}

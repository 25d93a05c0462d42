mod commands;
mod summary;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "diffim", about = "PSF-matched image subtraction")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Worker threads (default: all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match a template to a science image and subtract
    Subtract(commands::subtract::SubtractArgs),
    /// Run the footprint search and list clean footprints
    Footprints(commands::footprints::FootprintsArgs),
    /// Print or save the default config as TOML
    Config(commands::config::ConfigArgs),
    /// Describe a basis kernel set
    Basis(commands::basis::BasisArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure worker threads")?;
    }

    match &cli.command {
        Commands::Subtract(args) => commands::subtract::run(args),
        Commands::Footprints(args) => commands::footprints::run(args),
        Commands::Config(args) => commands::config::run(args),
        Commands::Basis(args) => commands::basis::run(args),
    }
}

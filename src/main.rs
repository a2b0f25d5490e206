#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use splinefit::config::Broadcast;
use splinefit::data::load_samples;
use splinefit::{BSpline, Builder, BuilderConfig, KnotSpacing, Smoothing, SmoothingSummary};
use std::fs;
use std::path::PathBuf;
use std::process;

#[derive(Clone, Copy, ValueEnum)]
pub enum KnotSpacingCli {
    AsSampled,
    Equidistant,
    Buckets,
}

impl From<KnotSpacingCli> for KnotSpacing {
    fn from(value: KnotSpacingCli) -> Self {
        match value {
            KnotSpacingCli::AsSampled => KnotSpacing::AsSampled,
            KnotSpacingCli::Equidistant => KnotSpacing::Equidistant,
            KnotSpacingCli::Buckets => KnotSpacing::Buckets,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SmoothingCli {
    None,
    Identity,
    PSpline,
}

impl From<SmoothingCli> for Smoothing {
    fn from(value: SmoothingCli) -> Self {
        match value {
            SmoothingCli::None => Smoothing::None,
            SmoothingCli::Identity => Smoothing::Identity,
            SmoothingCli::PSpline => Smoothing::PSpline,
        }
    }
}

#[derive(Args)]
pub struct FitArgs {
    /// Path to a TSV file with x1..xd, y and an optional weight column
    pub samples: PathBuf,

    /// TOML file with builder settings; command-line flags override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Polynomial degree for every variable
    #[arg(long, value_name = "N")]
    pub degree: Option<usize>,

    /// Knot placement strategy
    #[arg(long, value_enum)]
    pub knot_spacing: Option<KnotSpacingCli>,

    /// Regularization of the coefficient system
    #[arg(long, value_enum)]
    pub smoothing: Option<SmoothingCli>,

    /// Ridge parameter or initial P-spline smoothing parameter
    #[arg(long)]
    pub alpha: Option<f64>,

    /// Number of HFS re-estimations of the P-spline smoothing parameter
    #[arg(long, value_name = "K")]
    pub hfs_iters: Option<usize>,

    /// Relative padding of the equidistant knot range
    #[arg(long)]
    pub padding: Option<f64>,

    /// Basis functions per variable for equidistant knots (0 = automatic)
    #[arg(long, value_name = "N")]
    pub num_basis_functions: Option<usize>,

    /// Write the fit report here instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Parser)]
#[command(
    name = "splinefit",
    about = "Fit tensor-product B-splines to gridded samples",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a B-spline to a sample file and report knots and coefficients
    Fit(FitArgs),
}

/// Everything needed to reconstruct and assess the fitted spline.
#[derive(Serialize)]
struct FitReport {
    num_samples: usize,
    num_variables: usize,
    rms_residual: f64,
    degrees: Vec<usize>,
    basis_counts: Vec<usize>,
    knot_vectors: Vec<Vec<f64>>,
    coefficients: Vec<f64>,
    smoothing: SmoothingSummary,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Commands::Fit(args)) => fit(args),
        None => {
            if let Err(e) = Cli::command().print_help() {
                eprintln!("Error: {e}");
            }
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn fit(args: FitArgs) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = load_samples(&args.samples)?;

    let mut config = match &args.config {
        Some(path) => BuilderConfig::load(path)?,
        None => BuilderConfig::default(),
    };
    if let Some(degree) = args.degree {
        config.degree = Broadcast::Uniform(degree);
    }
    if let Some(count) = args.num_basis_functions {
        config.num_basis_functions = Broadcast::Uniform(count);
    }
    if let Some(spacing) = args.knot_spacing {
        config.knot_spacing = spacing.into();
    }
    if let Some(smoothing) = args.smoothing {
        config.smoothing = smoothing.into();
    }
    if let Some(alpha) = args.alpha {
        config.alpha = alpha;
    }
    if let Some(iterations) = args.hfs_iters {
        config.hfs_iters = iterations;
    }
    if let Some(padding) = args.padding {
        config.padding = padding;
    }
    if let Some(weights) = &loaded.weights {
        config.weights = weights.to_vec();
    }

    let builder = Builder::from_config(&loaded.table, &config)?;
    let (spline, summary) = builder.build_with_summary()?;

    let report = FitReport {
        num_samples: loaded.table.num_samples(),
        num_variables: loaded.table.num_variables(),
        rms_residual: rms_residual(&spline, &builder)?,
        degrees: spline.degrees().to_vec(),
        basis_counts: spline.num_basis_functions_per_variable().to_vec(),
        knot_vectors: spline.knot_vectors().iter().map(|k| k.to_vec()).collect(),
        coefficients: spline.coefficients().to_vec(),
        smoothing: summary,
    };
    let toml_string = toml::to_string_pretty(&report)?;

    match &args.output {
        Some(path) => {
            fs::write(path, toml_string)?;
            log::info!("Fit report saved to: {}", path.display());
        }
        None => print!("{toml_string}"),
    }
    Ok(())
}

fn rms_residual(spline: &BSpline, builder: &Builder) -> Result<f64, splinefit::BuildError> {
    let data = builder.data();
    let mut sum_sq = 0.0;
    for sample in data {
        let r = spline.eval(sample.x())? - sample.y();
        sum_sq += r * r;
    }
    Ok((sum_sq / data.num_samples() as f64).sqrt())
}

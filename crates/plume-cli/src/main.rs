//! plume-verify - point-source dispersion verification CLI
//!
//! ## Commands
//!
//! - `run`: run (or reuse) the simulator for every subtest and plot the
//!   results against the analytic solution
//! - `slices`: list the registered slices
//! - `analytic`: print the analytic profile along one slice

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plume_core::{
    define_slices, evaluate, evaluate_or_load, render_profile_md, AnalyticCase, ArtifactCache,
    HarnessConfig, Origin, SliceRegistry, SvgPlotter,
};
use plume_sim::{ProcessSimulator, VerificationPipeline, VerificationRequest};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "plume-verify")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compare simulator point-source dispersion against the analytic plume", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire results, evaluate the analytic solution and render figures
    Run {
        /// Harness configuration file
        #[arg(short, long, env = "PLUME_CONFIG", default_value = "harness.toml")]
        config: PathBuf,

        /// Re-run the simulator and re-evaluate the analytic solution
        #[arg(long)]
        overwrite: bool,

        /// Slice to render (repeatable; default: the configured default slice)
        #[arg(short, long = "slice", conflicts_with = "all")]
        slices: Vec<String>,

        /// Render every registered slice
        #[arg(long)]
        all: bool,

        /// Output directory for figures (default: <work_dir>/figures)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write markdown and JSON comparison reports
        #[arg(long)]
        report: bool,
    },

    /// List registered slices
    Slices {
        /// Harness configuration file (default: built-in slices)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the analytic concentration profile along a slice
    Analytic {
        /// Harness configuration file (default: built-in case and slices)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Slice name (default: the configured default slice)
        #[arg(short, long)]
        slice: Option<String>,

        /// Evaluation time in days, overriding the case
        #[arg(long)]
        time_days: Option<f64>,

        /// Print every n-th sample
        #[arg(long, default_value = "20")]
        stride: usize,

        /// Ignore cached profiles
        #[arg(long)]
        overwrite: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    plume_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            config,
            overwrite,
            slices,
            all,
            output,
            report,
        } => cmd_run(&config, overwrite, slices, all, output, report).await,
        Commands::Slices { config } => cmd_slices(config.as_deref()),
        Commands::Analytic {
            config,
            slice,
            time_days,
            stride,
            overwrite,
        } => cmd_analytic(config.as_deref(), slice, time_days, stride, overwrite),
    }
}

fn load_config(path: &Path) -> Result<HarnessConfig> {
    HarnessConfig::load(path).with_context(|| format!("Failed to load {}", path.display()))
}

async fn cmd_run(
    config_path: &Path,
    overwrite: bool,
    slices: Vec<String>,
    all: bool,
    output: Option<PathBuf>,
    report: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let registry = config.registry()?;
    let subtests = config.subtest_set()?;
    let run = config.run_config(overwrite);

    let slices = if all {
        registry.names().into_iter().map(String::from).collect()
    } else if slices.is_empty() {
        vec![config.default_slice.clone()]
    } else {
        slices
    };
    let output_dir = output.unwrap_or_else(|| run.work_dir.join("figures"));

    let request = VerificationRequest {
        slices,
        analytic: config.analytic.clone(),
        axes: config.plot.clone(),
        tolerance: config.tolerance,
        variable: config.simulator.variable.clone(),
        output_dir,
        write_reports: report,
    };

    println!("Input case: {}", run.input_case);
    println!("Subtests: {}", subtests.ids().join(", "));
    println!("Slices: {}", request.slices.join(", "));
    println!();

    let simulator = Arc::new(ProcessSimulator::new(config.simulator.clone()));
    let pipeline = VerificationPipeline::new(simulator, Arc::new(SvgPlotter), registry, run);
    let outcome = pipeline
        .run(&subtests, &request)
        .await
        .context("Verification run failed")?;

    println!("Run ID: {}", outcome.run_id);
    println!(
        "Status: {}",
        if outcome.passed() { "✓ PASSED" } else { "✗ FAILED" }
    );
    println!(
        "Simulator runs: {} ({}ms)",
        outcome.simulator_runs, outcome.duration_ms
    );
    println!();

    for slice in &outcome.slices {
        let status = if slice.passed() { "✓" } else { "✗" };
        let origin = match slice.analytic_origin {
            Origin::Loaded => "cached",
            Origin::Computed => "computed",
        };
        println!(
            "  {} {} -> {} (analytic {})",
            status,
            slice.report.slice,
            slice.figure.display(),
            origin
        );
        for comparison in &slice.report.comparisons {
            let deviation = comparison
                .max_rel_deviation()
                .map_or_else(|| "-".to_string(), |d| format!("{:.2}%", d * 100.0));
            println!(
                "      {}: {} points, max rel. deviation {}",
                comparison.subtest_id,
                comparison.rows.len(),
                deviation
            );
        }
        for exclusion in &slice.report.excluded {
            println!("      ✗ {}", exclusion);
        }
        if let Some(verdict) = &slice.report.verdict {
            println!("      {}", verdict.message);
            for violation in &verdict.violations {
                println!("        - {}", violation);
            }
        }
        for file in &slice.report_files {
            println!("      report: {}", file.display());
        }
    }

    println!();
    println!(
        "Summary: {}/{} slices passed",
        outcome.slices.len() - outcome.failed_slices().len(),
        outcome.slices.len()
    );

    if !outcome.passed() {
        anyhow::bail!(
            "Tolerance gate failed for: {}",
            outcome.failed_slices().join(", ")
        );
    }
    Ok(())
}

fn registry_from(config: Option<&HarnessConfig>) -> Result<SliceRegistry> {
    Ok(match config {
        Some(config) => config.registry()?,
        None => define_slices()?,
    })
}

fn cmd_slices(config_path: Option<&Path>) -> Result<()> {
    let config = config_path.map(load_config).transpose()?;
    let registry = registry_from(config.as_ref())?;

    println!("Slices ({}):", registry.len());
    for slice in registry.iter() {
        println!(
            "  {:<12} {} in [{}, {}] at {}",
            slice.name,
            slice.coordinate_label(),
            slice.domain.min,
            slice.domain.max,
            slice.cut_label()
        );
    }
    Ok(())
}

fn cmd_analytic(
    config_path: Option<&Path>,
    slice: Option<String>,
    time_days: Option<f64>,
    stride: usize,
    overwrite: bool,
) -> Result<()> {
    let config = config_path.map(load_config).transpose()?;
    let registry = registry_from(config.as_ref())?;

    let mut case = config
        .as_ref()
        .map_or_else(AnalyticCase::aligned_point_2d, |c| c.analytic.clone());
    if let Some(days) = time_days {
        case = case.with_time_days(days);
    }
    let slice_name = slice
        .or_else(|| config.as_ref().map(|c| c.default_slice.clone()))
        .unwrap_or_else(|| "centerline".to_string());
    let slice = registry.get(&slice_name)?;

    let (series, origin) = match &config {
        Some(config) => {
            let run = config.run_config(overwrite);
            let cache = ArtifactCache::new(&run.cache_dir)
                .with_context(|| format!("Failed to open cache {}", run.cache_dir.display()))?;
            let cached = evaluate_or_load(&case, slice, &cache, run.overwrite)?;
            (cached.value, cached.origin)
        }
        None => (evaluate(&case, slice)?, Origin::Computed),
    };
    info!(slice = %slice.name, origin = ?origin, samples = series.len(), "analytic profile ready");

    println!(
        "Analytic profile '{}' along {} ({}) at t = {} days",
        case.name,
        slice.name,
        slice.cut_label(),
        case.time_days()
    );
    println!();
    print!("{}", render_profile_md(&series, slice.coordinate_label(), stride));
    Ok(())
}

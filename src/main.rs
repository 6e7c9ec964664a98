// SPDX-License-Identifier: PMPL-1.0-or-later

//! stdstress: stress surveys of a standard library's tests and benchmarks

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use std::env;
use std::path::PathBuf;
use stdstress::build::{self, ExternalToolchain, Toolchain};
use stdstress::config::{StressConfig, ToolchainProfile};
use stdstress::discovery;
use stdstress::logging::{self, LogConfig, LogFormat};
use stdstress::naming;
use stdstress::report;
use stdstress::supervisor::Supervisor;
use stdstress::survey::{self, Survey};
use stdstress::synth;
use stdstress::types::PackageSuite;

#[derive(Parser)]
#[command(name = "stdstress")]
#[command(version = "0.3.0")]
#[command(about = "Concurrent stress surveys of a standard library's test suites")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Concurrent invocations inside each stress program
    #[arg(long, global = true, default_value_t = 100)]
    iters: usize,

    /// Build-and-run repetitions per case [default: 10, or what the last
    /// survey recorded when rebuilding a report]
    #[arg(long, global = true)]
    reruns: Option<usize>,

    /// Per-run timeout in seconds (0 disables)
    #[arg(long, global = true, default_value_t = 600)]
    timeout: u64,

    /// Concurrency degree handed to the toolchain and stress binaries
    #[arg(long, global = true, default_value_t = 10)]
    build_jobs: usize,

    /// Bound on in-flight workers in package-suite programs
    #[arg(long, global = true, default_value_t = 64)]
    max_workers: usize,

    /// Working directory for generated programs, logs and the report
    #[arg(long, global = true, default_value = ".")]
    work_dir: PathBuf,

    /// Toolchain profile (.json, .yaml or .yml)
    #[arg(long, global = true)]
    toolchain: Option<PathBuf>,

    /// Built package tree to discover (defaults to $GOROOT/src/pkg)
    #[arg(long, global = true)]
    source_root: Option<PathBuf>,

    /// Package list (.json, .yaml or .yml) used instead of discovery
    #[arg(long, global = true, conflicts_with = "source_root")]
    manifest: Option<PathBuf>,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Diagnostic log format
    #[arg(long, global = true, value_enum, default_value = "pretty")]
    log_format: LogFormat,

    /// Suppress per-run console lines
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Survey every case, then write the report
    Survey {
        /// Skip the report pass
        #[arg(long)]
        no_report: bool,
    },

    /// Rebuild the report from an existing working directory
    Report {
        /// Summary output format
        #[arg(long, value_enum, default_value = "text")]
        format: SummaryFormat,
    },

    /// Build and run one open-ended program exercising every package
    Runner,

    /// List discovered packages and their cases
    Discover {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SummaryFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_logging(&LogConfig {
        level: cli.log_level.clone(),
        format: cli.log_format,
    })?;

    let profile = match &cli.toolchain {
        Some(path) => ToolchainProfile::load(path)?,
        None => ToolchainProfile::detect(),
    };
    let reruns = match (cli.reruns, &cli.command) {
        (Some(reruns), _) => reruns,
        (None, Commands::Report { .. }) => {
            survey::recorded_reruns(&cli.work_dir, StressConfig::default().reruns)?
        }
        (None, _) => StressConfig::default().reruns,
    };
    let config = StressConfig {
        iters: cli.iters,
        reruns,
        timeout: StressConfig::timeout_from_secs(cli.timeout),
        build_jobs: cli.build_jobs,
        max_workers: cli.max_workers,
        work_dir: cli.work_dir.clone(),
        source_extension: profile.source_extension.clone(),
    };
    config.validate()?;

    match &cli.command {
        Commands::Survey { no_report } => {
            let suites = load_suites(&cli, &profile, true)?;
            let toolchain = external_toolchain(&profile, &config)?;
            let supervisor = Supervisor::new(config.timeout);
            let summary = Survey::new(&config, &toolchain, &supervisor)
                .quiet(cli.quiet)
                .run(&suites)?;

            println!(
                "\n{} {} cases surveyed, {} failing, {} skipped",
                "Survey complete:".bold().green(),
                summary.results.len(),
                summary.failing_cases(),
                summary.skipped.len()
            );
            if !no_report {
                let report = report::generate_report(&config)?;
                let ledger = survey::read_ledger(&config.ledger_path())?;
                report::print_summary(&report, &ledger);
            }
        }

        Commands::Report { format } => {
            let report = report::generate_report(&config)?;
            match format {
                SummaryFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                SummaryFormat::Text => {
                    let ledger_path = config.ledger_path();
                    let ledger = if ledger_path.is_file() {
                        survey::read_ledger(&ledger_path)?
                    } else {
                        Vec::new()
                    };
                    report::print_summary(&report, &ledger);
                }
            }
        }

        Commands::Runner => {
            let suites = load_suites(&cli, &profile, true)?;
            run_combined(&config, &profile, &suites, cli.quiet)?;
        }

        Commands::Discover { json } => {
            let suites = load_suites(&cli, &profile, false)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&suites)?);
            } else {
                print_suites(&suites);
            }
        }
    }

    Ok(())
}

/// Packages from the manifest if one was given, otherwise from the source
/// tree. Discovering from a tree also stages its test archives when asked.
fn load_suites(
    cli: &Cli,
    profile: &ToolchainProfile,
    stage: bool,
) -> Result<Vec<PackageSuite>> {
    if let Some(manifest) = &cli.manifest {
        return Ok(discovery::load_manifest(manifest)?);
    }
    let src_root = match &cli.source_root {
        Some(root) => root.clone(),
        None => env::var_os("GOROOT")
            .map(|root| PathBuf::from(root).join("src").join("pkg"))
            .ok_or_else(|| anyhow!("no --source-root or --manifest given and GOROOT is unset"))?,
    };
    let suites = discovery::discover_suites(&src_root, profile)?;
    if stage {
        let package_dirs = discovery::discover_package_dirs(&src_root)?;
        let isolated_root = profile.isolated_root(&cli.work_dir);
        let real_root = src_root.ancestors().nth(2).unwrap_or(src_root.as_path());
        discovery::stage_archives(&src_root, &package_dirs, &isolated_root, real_root)?;
    }
    Ok(suites)
}

fn external_toolchain(
    profile: &ToolchainProfile,
    config: &StressConfig,
) -> Result<ExternalToolchain> {
    let isolated_root = profile.isolated_root(&config.work_dir);
    let work_dir = std::path::absolute(&config.work_dir)
        .with_context(|| format!("resolving working directory {}", config.work_dir.display()))?;
    Ok(ExternalToolchain::new(
        profile.clone(),
        std::path::absolute(&isolated_root).unwrap_or(isolated_root),
        work_dir,
        config.build_jobs,
    ))
}

fn run_combined(
    config: &StressConfig,
    profile: &ToolchainProfile,
    suites: &[PackageSuite],
    quiet: bool,
) -> Result<()> {
    let program = synth::synthesize_runner(suites, config);
    let source = program.write_to(&config.work_dir)?;
    let run_dir = config.run_dir();
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("creating run directory {}", run_dir.display()))?;
    let toolchain = external_toolchain(profile, config)?;
    let artifact = build::build(&toolchain, &source, &config.binary_path())
        .with_context(|| format!("building {}", program.file_name))?;

    let log_path = config.work_dir.join(naming::failure_log_name(&program.file_name));
    if !quiet {
        println!(
            "{} {} packages, log {}",
            "Running combined stress program:".bold().cyan(),
            suites.len(),
            log_path.display()
        );
    }
    let run = Supervisor::new(config.timeout).run(
        &artifact.executable,
        &run_dir,
        &log_path,
        &toolchain.run_environment(),
    )?;
    let outcome = run.outcome();
    let verdict = if outcome.is_failure() {
        outcome.label().red().bold()
    } else {
        outcome.label().green()
    };
    println!("{} after {:.1?}", verdict, run.elapsed);
    Ok(())
}

fn print_suites(suites: &[PackageSuite]) {
    println!("{}", "DISCOVERED PACKAGES".bold().yellow());
    for suite in suites {
        println!(
            "  {} ({} tests, {} benchmarks)",
            suite.package.name().bold(),
            suite.tests.len(),
            suite.benchmarks.len()
        );
        for name in suite.tests.iter().chain(&suite.benchmarks) {
            println!("    {}", name.dimmed());
        }
    }
    println!("  Total: {}", suites.len());
}

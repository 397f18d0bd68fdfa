use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use needlebench::{
    load_report, report::views, save_report, worker_rungs, BenchConfig, CliOverrides, Harness,
    ReportFormat, ResultRecord,
};
use std::{num::NonZeroUsize, path::PathBuf, time::Instant};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
struct RunArgs {
    /// Input files to benchmark (glob patterns are expanded)
    sources: Vec<String>,

    /// Pattern to count in every sample
    #[arg(short = 'p', long)]
    pattern: Option<String>,

    /// Sample sizes as fractions of each source (e.g. 0.1,0.5,1.0)
    #[arg(short = 'f', long, value_delimiter = ',')]
    fractions: Vec<f64>,

    /// Worker counts for the parallel scanner (e.g. 1,2,4,8)
    #[arg(short = 'j', long, value_delimiter = ',')]
    threads: Vec<NonZeroUsize>,

    /// Derive worker counts from this many hardware threads instead of the detected count
    #[arg(long)]
    hardware_threads: Option<NonZeroUsize>,

    /// Skip the GPU scanner
    #[arg(long)]
    no_device: bool,

    /// Where to save the result table
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Report format (csv|json|yaml); guessed from the output extension when absent
    #[arg(long)]
    format: Option<ReportFormat>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pause before each timed search, in milliseconds
    #[arg(long)]
    settle_ms: Option<u64>,

    /// Log level (trace|debug|info|warn|error); RUST_LOG takes precedence
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the benchmark matrix over the given sources
    Run(Box<RunArgs>),

    /// Print the summary views of a saved report
    Summary {
        /// Report file (csv, json or yaml)
        #[arg(required = true)]
        report: PathBuf,
    },

    /// Print the worker counts the parallel scanner would be benchmarked with
    Rungs {
        /// Hardware threads to derive rungs for (default: detected)
        #[arg(long)]
        hardware_threads: Option<NonZeroUsize>,
    },
}

fn main() -> Result<()> {
    run()
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_benchmark(*args),
        Commands::Summary { report } => {
            init_tracing("warn");
            let records = load_report(&report)
                .with_context(|| format!("Failed to read report {}", report.display()))?;
            if records.is_empty() {
                println!("Report {} holds no records", report.display());
                return Ok(());
            }
            print_summary(&records);
            Ok(())
        }
        Commands::Rungs { hardware_threads } => {
            let threads = hardware_threads
                .map(NonZeroUsize::get)
                .unwrap_or_else(num_cpus::get);
            let rungs = worker_rungs(threads);
            println!("Hardware threads: {}", threads.to_string().green());
            for rung in rungs {
                println!("  ParallelCPU-{}Threads", rung);
            }
            Ok(())
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Expands glob patterns; a pattern matching nothing is kept as a literal path
/// so that the harness reports it as a missing source.
fn expand_sources(patterns: &[String]) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let matched: Vec<PathBuf> = match glob::glob(pattern) {
            Ok(entries) => entries.filter_map(|entry| entry.ok()).collect(),
            Err(e) => {
                debug!("'{}' is not a glob pattern ({}), using it as a path", pattern, e);
                Vec::new()
            }
        };
        if matched.is_empty() {
            paths.push(PathBuf::from(pattern));
        } else {
            paths.extend(matched);
        }
    }
    paths
}

fn run_benchmark(args: RunArgs) -> Result<()> {
    let file_config = BenchConfig::load_from(args.config.as_deref())
        .context("Failed to load configuration")?;

    let overrides = CliOverrides {
        pattern: args.pattern,
        sources: expand_sources(&args.sources),
        sample_fractions: (!args.fractions.is_empty()).then_some(args.fractions),
        thread_rungs: (!args.threads.is_empty()).then_some(args.threads),
        hardware_threads: args.hardware_threads,
        no_device: args.no_device,
        settle_ms: args.settle_ms,
        log_level: args.log_level,
        format: args
            .format
            .or_else(|| args.output.as_deref().map(ReportFormat::from_path)),
        output: args.output,
    };
    let mut config = file_config.merge_with_cli(overrides);
    init_tracing(&config.log_level);

    // Sources from a config file may be globs too
    config.sources = expand_sources(
        &config
            .sources
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>(),
    );
    if config.sources.is_empty() {
        bail!("No sources given; pass files to benchmark or list them in the config file");
    }

    let sources = config.sources.clone();
    let output = config.output.clone();
    let format = config.format;

    let mut harness = Harness::new(config)?;
    let total = (sources.len() * harness.measurements_per_source()) as u64;

    println!(
        "Counting {} in {} sources with {}",
        format!("{:?}", harness.config().pattern).yellow(),
        sources.len(),
        harness
            .strategies()
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let progress = ProgressBar::new(total);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} measurements")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );

    let started = Instant::now();
    let outcome = harness
        .run_files(&sources, |record| {
            // println() on a hidden bar drops the line, suspend() always prints
            progress.suspend(|| println!("{}", format_record(record)));
            progress.inc(1);
        })
        .map(|_| ());
    progress.finish_and_clear();

    let records = harness.records();
    let stats = harness.metrics().get_stats();
    println!(
        "\n{} measurements in {} ({} faulted, {} sources skipped)",
        stats.measurements,
        humantime::format_duration(std::time::Duration::from_millis(
            started.elapsed().as_millis() as u64
        )),
        stats.faults,
        stats.sources_skipped
    );

    if let Some(path) = &output {
        save_report(records, format, path)
            .with_context(|| format!("Failed to save report to {}", path.display()))?;
        println!("Results saved to {}", path.display().to_string().blue());
    }

    if !records.is_empty() {
        print_summary(records);
    }

    outcome.context("Benchmark finished with errors")?;
    if stats.sources_loaded == 0 {
        bail!("None of the {} sources could be loaded", sources.len());
    }
    Ok(())
}

fn format_record(record: &ResultRecord) -> String {
    let line = format!(
        "{:<20} {:>12} B  {:<22} {:>9}  {:>10} found  {:>6} ms",
        record.source_label,
        record.sample_size_bytes,
        record.strategy_name,
        record.parallelism,
        record.occurrence_count,
        record.duration_ms
    );
    match &record.error {
        Some(error) => format!("{}  {}", line.red(), error.red()),
        None => line,
    }
}

fn duration_cell(record: Option<&ResultRecord>) -> String {
    match record {
        Some(r) if r.is_ok() => humantime::format_duration(r.duration()).to_string(),
        Some(_) => "failed".red().to_string(),
        None => "-".dimmed().to_string(),
    }
}

fn print_summary(records: &[ResultRecord]) {
    println!("\n{}", "Serial vs. parallel vs. GPU".bold());
    println!(
        "{:<7} {:<20} {:>12}  {:>10}  {:>22}  {:>10}",
        "Sample", "Source", "Bytes", "Serial", "Best parallel", "GPU"
    );
    for row in views::comparison_view(records) {
        let parallel = match row.best_parallel {
            Some(r) => format!(
                "{} ({}x)",
                humantime::format_duration(r.duration()),
                r.parallelism
            ),
            None => "-".to_string(),
        };
        println!(
            "{:<7} {:<20} {:>12}  {:>10}  {:>22}  {:>10}",
            format!("{}%", row.percent),
            row.source_label,
            row.sample_size_bytes,
            duration_cell(row.serial),
            parallel,
            duration_cell(row.device)
        );
    }

    println!("\n{}", "Parallel scaling".bold());
    for series in views::scaling_view(records) {
        let points = series
            .points
            .iter()
            .map(|(workers, ms)| format!("{}: {} ms", workers, ms))
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "  {} ({} bytes): {}",
            series.source_label.blue(),
            series.sample_size_bytes,
            if points.is_empty() { "-".to_string() } else { points }
        );
    }

    let violations = views::agreement_violations(records);
    if violations.is_empty() {
        println!("\n{}", "All strategies agree on every count".green());
    } else {
        for v in violations {
            warn!("Counts disagree on {} ({} bytes)", v.source_label, v.sample_size_bytes);
            let counts = v
                .counts
                .iter()
                .map(|(name, count)| format!("{}={}", name, count))
                .collect::<Vec<_>>()
                .join(", ");
            println!(
                "{} {} ({} bytes): {}",
                "Counts disagree on".red(),
                v.source_label,
                v.sample_size_bytes,
                counts
            );
        }
    }
}

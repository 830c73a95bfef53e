//! pagefit CLI - fit heading and figure blocks onto printed pages

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use pagefit::{
    fit_batch, FitOptions, FitPipeline, FitReport, LayoutPolicy, PolicyPreset, SnapshotDocument,
};

#[derive(Parser)]
#[command(name = "pagefit")]
#[command(author = "iyulab")]
#[command(version)]
#[command(about = "Keep headings and their figures together on printed pages", long_about = None)]
struct Cli {
    /// Policy file (JSON); missing fields keep their defaults
    #[arg(long, global = true, env = "PAGEFIT_POLICY", value_name = "FILE")]
    policy: Option<PathBuf>,

    /// Policy preset, used when no policy file is given
    #[arg(long, global = true, value_enum)]
    preset: Option<PresetLevel>,

    /// Log per-block diagnostics
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a snapshot and print the planned adjustments as JSON
    Plan {
        /// Input snapshot
        #[arg(value_name = "SNAPSHOT")]
        input: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output compact JSON
        #[arg(long)]
        compact: bool,
    },

    /// Fit a snapshot and write the adjusted snapshot
    Fit {
        /// Input snapshot
        #[arg(value_name = "SNAPSHOT")]
        input: PathBuf,

        /// Output file (defaults to <name>.fitted.json)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Skip the corrective pass
        #[arg(long)]
        single_pass: bool,

        /// Also write the fit report as JSON
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Fit many snapshots in parallel
    Batch {
        /// Input snapshots
        #[arg(value_name = "SNAPSHOTS", required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory (defaults to next to each input)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Fit one snapshot at a time
        #[arg(long)]
        sequential: bool,
    },

    /// Print the effective policy as JSON
    Policy,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum PresetLevel {
    /// Higher floors, prefers page breaks over shrinking
    Conservative,
    /// Default thresholds
    Standard,
    /// Lower floors, packs more per page
    Aggressive,
}

impl From<PresetLevel> for PolicyPreset {
    fn from(level: PresetLevel) -> Self {
        match level {
            PresetLevel::Conservative => PolicyPreset::Conservative,
            PresetLevel::Standard => PolicyPreset::Standard,
            PresetLevel::Aggressive => PolicyPreset::Aggressive,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let result = load_options(&cli).and_then(|options| match cli.command {
        Commands::Plan {
            input,
            output,
            compact,
        } => cmd_plan(&input, output.as_deref(), compact, options),
        Commands::Fit {
            input,
            output,
            single_pass,
            report,
        } => cmd_fit(
            &input,
            output.as_deref(),
            single_pass,
            report.as_deref(),
            options,
        ),
        Commands::Batch {
            inputs,
            output,
            sequential,
        } => cmd_batch(&inputs, output.as_deref(), sequential, options),
        Commands::Policy => cmd_policy(&options.policy),
    });

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn load_options(cli: &Cli) -> Result<FitOptions, Box<dyn std::error::Error>> {
    let policy = match (&cli.policy, cli.preset) {
        (Some(path), _) => {
            log::debug!("Loading policy from {}", path.display());
            LayoutPolicy::from_json_file(path)
                .map_err(|e| format!("Invalid policy file {}: {}", path.display(), e))?
        }
        (None, Some(preset)) => LayoutPolicy::from_preset(preset.into()),
        (None, None) => LayoutPolicy::default(),
    };
    let mut options = FitOptions::new().with_policy(policy);
    if cli.verbose {
        options = options.verbose();
    }
    Ok(options)
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    input.with_file_name(format!("{}.fitted.json", stem))
}

fn cmd_plan(
    input: &Path,
    output: Option<&Path>,
    compact: bool,
    options: FitOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let doc = SnapshotDocument::from_file(input)?;
    let plan = FitPipeline::new(options).plan(&doc);

    let json = if compact {
        serde_json::to_string(&plan)?
    } else {
        serde_json::to_string_pretty(&plan)?
    };

    if let Some(path) = output {
        fs::write(path, &json)?;
        println!("{} {}", "Saved to".green(), path.display());
    } else {
        println!("{}", json);
    }

    Ok(())
}

fn cmd_fit(
    input: &Path,
    output: Option<&Path>,
    single_pass: bool,
    report_path: Option<&Path>,
    mut options: FitOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    if single_pass {
        options = options.without_corrective_pass();
    }

    let mut doc = SnapshotDocument::from_file(input)?;
    let report = FitPipeline::new(options).run(&mut doc)?;

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output(input));
    doc.to_file(&output)?;

    if let Some(path) = report_path {
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
    }

    print_summary(input, &report);
    println!("{} {}", "Saved to".green(), output.display());
    Ok(())
}

fn cmd_batch(
    inputs: &[PathBuf],
    output_dir: Option<&Path>,
    sequential: bool,
    mut options: FitOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    if sequential {
        options = options.sequential();
    }
    if let Some(dir) = output_dir {
        fs::create_dir_all(dir)?;
    }

    let pb = ProgressBar::new(inputs.len() as u64 * 2);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    pb.set_message("Loading snapshots...");
    let mut loaded = Vec::new();
    let mut failures = Vec::new();
    for input in inputs {
        match SnapshotDocument::from_file(input) {
            Ok(doc) => loaded.push((input.clone(), doc)),
            Err(e) => failures.push((input.clone(), e.to_string())),
        }
        pb.inc(1);
    }
    // unloadable snapshots have nothing to write
    pb.inc(failures.len() as u64);

    pb.set_message("Fitting...");
    let (paths, mut docs): (Vec<PathBuf>, Vec<SnapshotDocument>) = loaded.into_iter().unzip();
    let results = fit_batch(&mut docs, &options);

    pb.set_message("Writing...");
    let mut fitted = Vec::new();
    for ((path, doc), result) in paths.iter().zip(&docs).zip(results) {
        let target = match output_dir {
            Some(dir) => dir.join(path.file_name().unwrap_or_default()),
            None => default_output(path),
        };
        match result.and_then(|report| doc.to_file(&target).map(|_| report)) {
            Ok(report) => fitted.push((path.clone(), report)),
            Err(e) => failures.push((path.clone(), e.to_string())),
        }
        pb.inc(1);
    }
    pb.finish_with_message("Done!");

    println!();
    for (path, report) in &fitted {
        print_summary(path, report);
    }
    for (path, error) in &failures {
        println!("{} {}: {}", "✗".red(), path.display(), error);
    }

    println!(
        "\n{} {} fitted, {} failed",
        "Batch:".cyan().bold(),
        fitted.len(),
        failures.len()
    );
    if failures.is_empty() {
        Ok(())
    } else {
        Err(format!("{} snapshots failed", failures.len()).into())
    }
}

fn cmd_policy(policy: &LayoutPolicy) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(policy)?);
    Ok(())
}

fn print_summary(input: &Path, report: &FitReport) {
    let stats = &report.stats;
    println!("{} {}", "Fitted".cyan().bold(), input.display());
    if report.degraded() {
        println!(
            "  {} {}",
            "├─".dimmed(),
            "page could not be measured; left unscaled".yellow()
        );
    }
    println!(
        "  {} {} overflowing blocks over {} passes",
        "├─".dimmed(),
        stats.blocks_found,
        stats.pass_count
    );
    if let Some(worst) = report
        .passes
        .first()
        .and_then(|p| p.analysis.max_overflow_ratio())
    {
        println!("  {} worst overflow {:.2}x", "├─".dimmed(), worst);
    }
    println!(
        "  {} {} adjusted ({} figure only, {} entire block), {} skipped",
        "├─".dimmed(),
        stats.applied_count,
        stats.figure_only_count,
        stats.entire_block_count,
        stats.skipped_count
    );
    if let Some(min) = stats.min_scale {
        println!("  {} smallest scale {:.2}", "├─".dimmed(), min);
    }
    if report.is_clean() {
        println!("  {} {}", "└─".dimmed(), "no residual overflow".green());
    } else {
        println!(
            "  {} residual overflow: {}",
            "└─".dimmed(),
            report.residual_overflow.join(", ").yellow()
        );
    }
}

//! envexp - Environment Experiment Runner CLI
//!
//! The `envexp` command rebuilds a conda-family environment from a manifest,
//! checks that a library's import surface and the user's smoke test still work
//! inside it, and commits the outcome to git.
//!
//! ## Commands
//!
//! - `run`: Full experiment (resolve, rebuild, scan, test, snapshot, commit)
//! - `scan`: Extract a library's imports into a test package, nothing else
//! - `resolve`: Show which environment manager would be used

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use conda_env_manager::{CommandRunner, ProcessRunner, ToolResolver};
use envexp_core::{
    init_tracing, Experiment, ExperimentConfig, ExtractedModuleSet, ImportScanner, RunReport,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "envexp")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Environment experiment runner", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and results
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (default: ./envexp.toml if present)
    #[arg(short, long, global = true, env = "ENVEXP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the environment, run the checks and commit the outcome
    Run(RunArgs),

    /// Extract a library's imports into a test package
    Scan(ScanArgs),

    /// Probe for an environment manager and print the one found
    Resolve,
}

/// Import scan options shared by `run` and `scan`.
#[derive(Args, Debug, Default)]
struct ScanArgs {
    /// Library whose imports are extracted (e.g. `qtpy`)
    #[arg(short, long, env = "ENVEXP_LIBRARY")]
    library: Option<String>,

    /// Source tree to scan
    #[arg(short, long, env = "ENVEXP_INPUT_DIR")]
    input_dir: Option<PathBuf>,

    /// Directory the test package is written to (default: <work-dir>/experiment)
    #[arg(short, long, env = "ENVEXP_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Drop import lines containing any of these substrings
    #[arg(long, value_delimiter = ',', env = "ENVEXP_EXCLUDE")]
    exclude: Vec<String>,

    /// Only match imports at column zero
    #[arg(long, env = "ENVEXP_TOP_LEVEL_ONLY")]
    top_level_only: bool,

    /// Source file extension to scan
    #[arg(long, env = "ENVEXP_FILE_EXTENSION")]
    file_extension: Option<String>,

    /// Directory relative paths are resolved against
    #[arg(short, long, env = "ENVEXP_WORK_DIR")]
    work_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    #[command(flatten)]
    scan: ScanArgs,

    /// Commit message; tagged `P: ` or `F: ` with the outcome
    #[arg(short = 'm', long, env = "ENVEXP_COMMIT_MESSAGE")]
    commit_message: Option<String>,

    /// Name of the disposable environment
    #[arg(short, long, env = "ENVEXP_ENV_NAME")]
    env_name: Option<String>,

    /// Environment manifest passed to `env create -f`
    #[arg(long, env = "ENVEXP_MANIFEST")]
    manifest: Option<PathBuf>,

    /// Run log file (default: <work-dir>/test.log)
    #[arg(long, env = "ENVEXP_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Per-command timeout in seconds, 0 for none
    #[arg(long, env = "ENVEXP_COMMAND_TIMEOUT")]
    command_timeout: Option<u64>,

    /// Smoke test command, run inside the environment (after `--`)
    #[arg(last = true)]
    user_test: Vec<String>,
}

impl ScanArgs {
    fn apply(&self, config: &mut ExperimentConfig) {
        if let Some(library) = &self.library {
            config.library = Some(library.clone());
        }
        if let Some(dir) = &self.input_dir {
            config.input_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = Some(dir.clone());
        }
        if !self.exclude.is_empty() {
            config.exclude = self.exclude.clone();
        }
        if self.top_level_only {
            config.top_level_only = true;
        }
        if let Some(ext) = &self.file_extension {
            config.file_extension = ext.clone();
        }
        if let Some(dir) = &self.work_dir {
            config.work_dir = dir.clone();
        }
    }
}

impl RunArgs {
    fn apply(&self, config: &mut ExperimentConfig) {
        self.scan.apply(config);
        if let Some(message) = &self.commit_message {
            config.commit_message = Some(message.clone());
        }
        if let Some(name) = &self.env_name {
            config.env_name = name.clone();
        }
        if let Some(manifest) = &self.manifest {
            config.manifest = manifest.clone();
        }
        if let Some(log_file) = &self.log_file {
            config.log_file = Some(log_file.clone());
        }
        if let Some(secs) = self.command_timeout {
            config.command_timeout_secs = secs;
        }
        if !self.user_test.is_empty() {
            config.user_test = self.user_test.clone();
        }
    }
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
    init_tracing(cli.json, level);

    let mut config = ExperimentConfig::discover(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Run(args) => {
            args.apply(&mut config);
            cmd_run(config, Arc::new(ProcessRunner), cli.json).await
        }
        Commands::Scan(args) => {
            args.apply(&mut config);
            cmd_scan(&config, cli.json)
        }
        Commands::Resolve => cmd_resolve(&config, &ProcessRunner, cli.json).await,
    }
}

/// Run one experiment and report it
async fn cmd_run(config: ExperimentConfig, runner: Arc<dyn CommandRunner>, json: bool) -> Result<()> {
    let experiment = Experiment::new(config, runner).context("Invalid run configuration")?;
    let report = experiment
        .run()
        .await
        .context("Failed to start experiment run")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.passed() {
        Ok(())
    } else {
        anyhow::bail!("Experiment failed")
    }
}

fn print_report(report: &RunReport) {
    println!("Run ID: {}", report.run_id);
    if let Some(tool) = &report.tool {
        println!("Tool: {}", tool);
    }
    let states: Vec<String> = report.states.iter().map(|s| s.to_string()).collect();
    println!("States: {}", states.join(" -> "));
    if let Some(scan) = &report.scan {
        println!(
            "Scan: {} imports in {} modules ({} files scanned, {} unterminated)",
            scan.imports, scan.modules, scan.files_scanned, scan.unterminated
        );
    }
    if let Some(snapshot) = &report.snapshot {
        println!(
            "Snapshot: {} packages, {} frozen requirements",
            snapshot.packages.len(),
            snapshot.freeze.len()
        );
    }
    println!();

    println!(
        "Status: {}",
        if report.passed() { "✓ PASSED" } else { "✗ FAILED" }
    );
    if let Some(detail) = &report.outcome.detail {
        println!("{}", detail);
    }

    println!();
    println!("Commit: {}", report.commit_message.lines().next().unwrap_or_default());
    match (&report.commit_sha, &report.commit_error) {
        (Some(sha), _) => println!("  {}", sha),
        (None, Some(err)) => println!("  ✗ {}", err),
        (None, None) => {}
    }
}

/// Scan only; no environment is touched
fn cmd_scan(config: &ExperimentConfig, json: bool) -> Result<()> {
    let (library, input_dir) = config.scan_target().context(
        "Both --library and --input-dir are required for scan (flags, env or config file)",
    )?;

    let set = ImportScanner::new(library)
        .exclude(config.exclude.iter().cloned())
        .top_level_only(config.top_level_only)
        .extension(config.file_extension.as_str())
        .scan(input_dir, &config.output_path())
        .with_context(|| format!("Failed to scan {:?}", input_dir))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&set)?);
    } else {
        print_scan(&set);
    }
    Ok(())
}

fn print_scan(set: &ExtractedModuleSet) {
    println!("Package: {} ({:?})", set.package, set.output_root);
    println!(
        "Extracted {} imports into {} modules from {} files",
        set.total_imports(),
        set.records.len(),
        set.files_scanned
    );
    for record in &set.records {
        println!("  {} ({} lines)", record.module, record.extracted_lines.len());
    }
    if !set.unterminated.is_empty() {
        println!("Unterminated imports (dropped):");
        for open in &set.unterminated {
            println!("  - {:?}:{} {}", open.source_file, open.line, open.text);
        }
    }
}

/// Show the environment manager that would be used
async fn cmd_resolve(config: &ExperimentConfig, runner: &dyn CommandRunner, json: bool) -> Result<()> {
    let resolver = ToolResolver::with_candidates(config.candidates.iter().cloned())
        .probe_timeout_secs(config.probe_timeout_secs);
    info!(candidates = ?resolver.candidates(), "Probing environment managers");

    let tool = resolver
        .resolve(runner)
        .await
        .context("Failed to resolve an environment manager")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tool)?);
    } else {
        println!("Tool: {}", tool);
        println!("Version: {}", tool.version);
        println!(
            "Yes flag: {}",
            if tool.needs_yes_flag() { "yes" } else { "no" }
        );
    }
    Ok(())
}
